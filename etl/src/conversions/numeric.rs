// adapted from the bigdecimal crate
use bigdecimal::{
    BigDecimal, ParseBigDecimalError,
    num_bigint::{BigInt, BigUint, Sign},
};
use byteorder::{BigEndian, ReadBytesExt};
use std::{fmt, io::Cursor, str::FromStr};
use tokio_postgres::types::{FromSql, Type};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Exact representation of a Postgres `numeric`, including its special values.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Clone)]
pub enum PgNumeric {
    NaN,
    PositiveInf,
    NegativeInf,
    Value(BigDecimal),
}

impl FromStr for PgNumeric {
    type Err = ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match BigDecimal::from_str(s) {
            Ok(n) => Ok(PgNumeric::Value(n)),
            Err(e) => match s.to_lowercase().as_str() {
                "nan" => Ok(PgNumeric::NaN),
                "infinity" => Ok(PgNumeric::PositiveInf),
                "-infinity" => Ok(PgNumeric::NegativeInf),
                _ => Err(e),
            },
        }
    }
}

/// Decodes the binary wire format: digit count, weight, sign and display scale as 16 bit
/// integers followed by base 10000 digits.
impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + 'static + Sync + Send>> {
        let mut rdr = Cursor::new(raw);

        let n_digits = rdr.read_u16::<BigEndian>()?;
        let weight = rdr.read_i16::<BigEndian>()?;
        let sign = match rdr.read_u16::<BigEndian>()? {
            NUMERIC_NEG => Sign::Minus,
            NUMERIC_POS => Sign::Plus,
            NUMERIC_NAN => return Ok(PgNumeric::NaN),
            NUMERIC_PINF => return Ok(PgNumeric::PositiveInf),
            NUMERIC_NINF => return Ok(PgNumeric::NegativeInf),
            v => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid numeric sign {v:#06x}"),
                )
                .into());
            }
        };
        let scale = rdr.read_u16::<BigEndian>()?;

        let mut magnitude = BigUint::from(0u32);
        for n in (0..n_digits).rev() {
            let digit = rdr.read_u16::<BigEndian>()?;
            magnitude += BigUint::from(digit) * BigUint::from(10_000u32).pow(u32::from(n));
        }

        // The leading digit carries a factor of 10_000^(n_digits - 1) but must carry
        // 10_000^weight.
        let correction_exp = 4 * (i64::from(weight) - i64::from(n_digits) + 1);
        let value = BigDecimal::new(BigInt::from_biguint(sign, magnitude), -correction_exp)
            .with_scale(i64::from(scale));

        Ok(PgNumeric::Value(value))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC)
    }
}

impl fmt::Display for PgNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgNumeric::NaN => write!(f, "NaN"),
            PgNumeric::PositiveInf => write!(f, "Infinity"),
            PgNumeric::NegativeInf => write!(f, "-Infinity"),
            PgNumeric::Value(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(n_digits: u16, weight: i16, sign: u16, scale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&n_digits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            raw.extend_from_slice(&digit.to_be_bytes());
        }
        raw
    }

    #[test]
    fn decodes_fractional_value_with_display_scale() {
        let raw = encode(2, 0, NUMERIC_POS, 2, &[12, 3400]);

        let numeric = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();

        assert_eq!(numeric.to_string(), "12.34");
    }

    #[test]
    fn decodes_negative_large_value() {
        // -1234567 = 123 * 10000 + 4567
        let raw = encode(2, 1, NUMERIC_NEG, 0, &[123, 4567]);

        let numeric = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();

        assert_eq!(numeric, "-1234567".parse::<PgNumeric>().unwrap());
    }

    #[test]
    fn decodes_special_values() {
        for (sign, expected) in [
            (NUMERIC_NAN, PgNumeric::NaN),
            (NUMERIC_PINF, PgNumeric::PositiveInf),
            (NUMERIC_NINF, PgNumeric::NegativeInf),
        ] {
            let raw = encode(0, 0, sign, 0, &[]);
            assert_eq!(PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap(), expected);
        }
    }

    #[test]
    fn rejects_truncated_and_invalid_input() {
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 1]).is_err());
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &encode(0, 0, 0x1234, 0, &[])).is_err());
    }
}
