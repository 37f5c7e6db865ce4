use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, Mul, Neg, Sub},
};

///
/// Rational
/// Exact fraction kept in lowest terms with a positive denominator.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct Rational {
    num: BigInt,
    den: BigInt,
}

pub(crate) fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
    let mut a = a.abs();
    let mut b = b.abs();
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }

    a
}

impl Rational {
    pub(crate) fn new(num: BigInt, den: BigInt) -> Option<Self> {
        if den.is_zero() {
            return None;
        }
        let g = gcd(&num, &den);
        let (mut num, mut den) = (num / &g, den / &g);
        if den.is_negative() {
            num = -num;
            den = -den;
        }

        Some(Self { num, den })
    }

    pub(crate) fn integer(n: impl Into<BigInt>) -> Self {
        Self {
            num: n.into(),
            den: BigInt::one(),
        }
    }

    pub(crate) fn zero() -> Self {
        Self::integer(0)
    }

    pub(crate) fn one() -> Self {
        Self::integer(1)
    }

    /// Exact value of the shortest decimal that round-trips `value`.
    pub(crate) fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let text = format!("{value:e}");
        let (mantissa, exponent) = text.split_once('e')?;
        let exponent: i32 = exponent.parse().ok()?;
        let (negative, mantissa) = match mantissa.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, mantissa),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let digits: BigInt = format!("{int_part}{frac_part}").parse().ok()?;
        let scale = exponent - i32::try_from(frac_part.len()).ok()?;

        let ten = BigInt::from(10);
        let magnitude = if scale >= 0 {
            Self::integer(digits * num_traits::pow(ten, scale.unsigned_abs() as usize))
        } else {
            Self::new(digits, num_traits::pow(ten, scale.unsigned_abs() as usize))?
        };

        Some(if negative { -magnitude } else { magnitude })
    }

    pub(crate) fn to_f64(&self) -> Option<f64> {
        const EXACT: u64 = 1 << 53;
        let small = |n: &BigInt| n.abs().to_u64().is_some_and(|v| v <= EXACT);

        let value = if small(&self.num) && small(&self.den) {
            // both exact, so the quotient is correctly rounded
            self.num.to_f64()? / self.den.to_f64()?
        } else {
            // 64-bit quotient scaled back by a power of two
            let bits = |n: &BigInt| i64::try_from(n.bits()).ok();
            let shift = bits(&self.den)? - bits(&self.num)? + 64;
            let quotient = if shift >= 0 {
                (&self.num << usize::try_from(shift).ok()?) / &self.den
            } else {
                &self.num / (&self.den << usize::try_from(-shift).ok()?)
            };
            let half = i32::try_from(shift / 2).ok()?;
            let rest = i32::try_from(shift).ok()? - half;
            quotient.to_f64()? * 2f64.powi(-half) * 2f64.powi(-rest)
        };

        value.is_finite().then_some(value)
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub(crate) fn is_one(&self) -> bool {
        self.num.is_one() && self.den.is_one()
    }

    pub(crate) fn is_negative(&self) -> bool {
        self.num.sign() == Sign::Minus
    }

    pub(crate) const fn numer(&self) -> &BigInt {
        &self.num
    }

    pub(crate) const fn denom(&self) -> &BigInt {
        &self.den
    }

    pub(crate) fn abs(&self) -> Self {
        Self {
            num: self.num.abs(),
            den: self.den.clone(),
        }
    }

    pub(crate) fn recip(&self) -> Option<Self> {
        Self::new(self.den.clone(), self.num.clone())
    }

    pub(crate) fn checked_div(&self, rhs: &Self) -> Option<Self> {
        Self::new(&self.num * &rhs.den, &self.den * &rhs.num)
    }
}

impl Add for &Rational {
    type Output = Rational;

    fn add(self, rhs: Self) -> Rational {
        let num = &self.num * &rhs.den + &rhs.num * &self.den;
        let den = &self.den * &rhs.den;
        Rational::new(num, den).unwrap_or_else(Rational::zero)
    }
}

impl Sub for &Rational {
    type Output = Rational;

    fn sub(self, rhs: Self) -> Rational {
        self + &(-rhs.clone())
    }
}

impl Mul for &Rational {
    type Output = Rational;

    fn mul(self, rhs: Self) -> Rational {
        let num = &self.num * &rhs.num;
        let den = &self.den * &rhs.den;
        Rational::new(num, den).unwrap_or_else(Rational::zero)
    }
}

impl Neg for Rational {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            num: -self.num,
            den: self.den,
        }
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.num * &other.den).cmp(&(&other.num * &self.den))
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den.is_one() {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rational {
        Rational::new(BigInt::from(n), BigInt::from(d)).expect("denominator should be non-zero")
    }

    #[test]
    fn construction_reduces_and_normalizes_sign() {
        assert_eq!(r(6, -4), r(-3, 2));
        assert_eq!(r(0, 5), Rational::zero());
        assert!(Rational::new(BigInt::from(1), BigInt::from(0)).is_none());
    }

    #[test]
    fn decimal_conversion_is_exact() {
        assert_eq!(Rational::from_f64(0.1), Some(r(1, 10)));
        assert_eq!(Rational::from_f64(-2.5), Some(r(-5, 2)));
        assert_eq!(Rational::from_f64(1500.0), Some(r(1500, 1)));
        assert_eq!(Rational::from_f64(f64::NAN), None);

        let tenth_sum = &r(1, 10) + &r(2, 10);
        assert_eq!(tenth_sum, r(3, 10));
        assert_eq!(tenth_sum.to_f64(), Some(0.3));
    }

    #[test]
    fn arithmetic_and_ordering_agree() {
        let a = r(1, 3);
        let b = r(1, 6);

        assert_eq!(&a + &b, r(1, 2));
        assert_eq!(&a - &b, b);
        assert_eq!(&a * &b, r(1, 18));
        assert_eq!(a.checked_div(&b), Some(r(2, 1)));
        assert!(a.checked_div(&Rational::zero()).is_none());
        assert!(a > b);
        for extreme in [1e300, -3.5e250, 1e-300] {
            let back = Rational::from_f64(extreme)
                .and_then(|v| v.to_f64())
                .expect("finite extremes should convert back");
            assert!((back - extreme).abs() <= extreme.abs() * 1e-15, "{extreme} -> {back}");
        }
        assert_eq!(r(-2, 3).to_string(), "-2/3");
    }
}
