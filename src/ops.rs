use {crate::error::Error, std::marker::PhantomData};

pub(crate) trait UnOp<T> {
    type Output;

    fn un_op(x: T) -> Result<Self::Output, Error>;
}

pub(crate) trait BinOp<T> {
    type Output;

    fn bin_op(x0: T, x1: T) -> Result<Self::Output, Error>;
}

pub(crate) struct Eq;
pub(crate) struct Ne;
pub(crate) struct Lt;
pub(crate) struct Le;
pub(crate) struct Gt;
pub(crate) struct Ge;
pub(crate) struct Add;
pub(crate) struct Sub;
pub(crate) struct Mul;
pub(crate) struct Div;
pub(crate) struct Rem;
pub(crate) struct And;
pub(crate) struct Or;
pub(crate) struct Xor;
pub(crate) struct Shl;
pub(crate) struct Shr;
pub(crate) struct Neg;
pub(crate) struct Not;

pub(crate) struct ConvertTo<T>(PhantomData<T>);
pub(crate) struct TruncTo<T>(PhantomData<T>);
pub(crate) struct SignExtendFrom<T>(PhantomData<T>);

macro_rules! impl_rel_ops {
    ($($T:ty)*) => {
        $(
            impl BinOp<$T> for Eq {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 == x1)
                }
            }

            impl BinOp<$T> for Ne {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 != x1)
                }
            }

            impl BinOp<$T> for Lt {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 < x1)
                }
            }

            impl BinOp<$T> for Le {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 <= x1)
                }
            }

            impl BinOp<$T> for Gt {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 > x1)
                }
            }

            impl BinOp<$T> for Ge {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 >= x1)
                }
            }
        )*
    }
}

impl_rel_ops! { i32 u32 f32 }

macro_rules! impl_int_ops {
    ($($T:ty)*) => {
        $(
            impl BinOp<$T> for Add {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0.wrapping_add(x1))
                }
            }

            impl BinOp<$T> for Sub {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0.wrapping_sub(x1))
                }
            }

            impl BinOp<$T> for Mul {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0.wrapping_mul(x1))
                }
            }

            impl BinOp<$T> for Div {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    if x1 == 0 {
                        return Err(Error::IntegerDivideByZero);
                    }
                    Ok(x0.wrapping_div(x1))
                }
            }

            impl BinOp<$T> for Rem {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    if x1 == 0 {
                        return Err(Error::IntegerDivideByZero);
                    }
                    Ok(x0.wrapping_rem(x1))
                }
            }

            impl BinOp<$T> for And {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 & x1)
                }
            }

            impl BinOp<$T> for Or {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 | x1)
                }
            }

            impl BinOp<$T> for Xor {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 ^ x1)
                }
            }

            // Shift counts are taken modulo the bit width.
            impl BinOp<$T> for Shl {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0.wrapping_shl(x1 as u32))
                }
            }

            impl BinOp<$T> for Shr {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0.wrapping_shr(x1 as u32))
                }
            }

            impl UnOp<$T> for Not {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Error> {
                    Ok(!x)
                }
            }
        )*
    }
}

impl_int_ops! { i32 u32 }

impl UnOp<i32> for Neg {
    type Output = i32;

    fn un_op(x: i32) -> Result<Self::Output, Error> {
        Ok(x.wrapping_neg())
    }
}

impl UnOp<f32> for Neg {
    type Output = f32;

    fn un_op(x: f32) -> Result<Self::Output, Error> {
        Ok(-x)
    }
}

macro_rules! impl_float_ops {
    ($($T:ty)*) => {
        $(
            impl BinOp<$T> for Add {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 + x1)
                }
            }

            impl BinOp<$T> for Sub {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 - x1)
                }
            }

            impl BinOp<$T> for Mul {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 * x1)
                }
            }

            impl BinOp<$T> for Div {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Error> {
                    Ok(x0 / x1)
                }
            }
        )*
    }
}

impl_float_ops! { f32 }

impl UnOp<i32> for ConvertTo<f32> {
    type Output = f32;

    fn un_op(x: i32) -> Result<Self::Output, Error> {
        Ok(x as f32)
    }
}

// Truncates through a 64-bit intermediate, so that values beyond the range of `i32` wrap instead
// of saturating.
impl UnOp<f32> for TruncTo<i32> {
    type Output = i32;

    fn un_op(x: f32) -> Result<Self::Output, Error> {
        Ok(x as i64 as i32)
    }
}

macro_rules! impl_sign_extend_from {
    ($($T:ty),*) => {
        $(
            impl UnOp<i32> for SignExtendFrom<$T> {
                type Output = i32;

                fn un_op(x: i32) -> Result<Self::Output, Error> {
                    Ok(i32::from(x as $T))
                }
            }
        )*
    }
}

impl_sign_extend_from! { i8, i16 }
