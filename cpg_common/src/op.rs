/// Implement the standard arithmetic operator traits for a single-field tuple newtype.
///
/// `op!(binary Money, Add, add)` expands to `impl Add for Money`, and similarly for
/// the `inplace` (`AddAssign` and friends) and `unary` (`Neg`) forms.
#[macro_export]
macro_rules! op {
    (binary $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0, rhs.0))
            }
        }
    };
    (inplace $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            fn $method(&mut self, rhs: Self) {
                std::ops::$trait::$method(&mut self.0, rhs.0);
            }
        }
    };
    (unary $ty:ty, $trait:ident, $method:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(std::ops::$trait::$method(self.0))
            }
        }
    };
}
