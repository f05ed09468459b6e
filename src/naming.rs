//! Vector naming conventions.
//!
//! Derived vectors are named by prefixing the name of the cumulative vector they are computed
//! from: `AVG_` for the average rate per day and `INTVL_` for the change over the interval.
//! `AVG_FOPT` is the average daily rate computed from `FOPT`.

use crate::error::SummaryError;

/// Prefix of average daily rate vectors
pub const PER_DAY_PREFIX: &str = "AVG_";
/// Prefix of interval delta vectors
pub const PER_INTERVAL_PREFIX: &str = "INTVL_";

pub fn is_per_day_vector(vector: &str) -> bool {
    vector.starts_with(PER_DAY_PREFIX)
}

pub fn is_per_interval_vector(vector: &str) -> bool {
    vector.starts_with(PER_INTERVAL_PREFIX)
}

/// Returns true if `vector` names a derived per day or per interval vector.
pub fn is_per_interval_or_per_day_vector(vector: &str) -> bool {
    is_per_day_vector(vector) || is_per_interval_vector(vector)
}

/// Name of the cumulative vector a derived vector is computed from.
///
/// Removes exactly one literal prefix, so `AVG_AVG_X` yields `AVG_X`.
pub fn get_cumulative_vector_name(vector: &str) -> Result<&str, SummaryError> {
    vector
        .strip_prefix(PER_DAY_PREFIX)
        .or_else(|| vector.strip_prefix(PER_INTERVAL_PREFIX))
        .ok_or_else(|| SummaryError::MissingDerivedPrefix {
            vector_name: vector.to_string(),
        })
}

pub fn create_per_day_vector_name(vector: &str) -> String {
    format!("{}{}", PER_DAY_PREFIX, vector)
}

pub fn create_per_interval_vector_name(vector: &str) -> String {
    format!("{}{}", PER_INTERVAL_PREFIX, vector)
}

/// Name of a derived column in Eclipse rate notation.
///
/// Rates replace the first `T` at or after the fourth character with `R`, so `FOPT` becomes
/// `AVG_FOPR` and `WOPT:OP_1` becomes `AVG_WOPR:OP_1`. Deltas keep the cumulative name.
pub fn rename_vec_from_cum(vector: &str, as_rate: bool) -> String {
    if !as_rate {
        return create_per_interval_vector_name(vector);
    }
    let split = vector
        .char_indices()
        .nth(3)
        .map_or(vector.len(), |(index, _)| index);
    let (head, tail) = vector.split_at(split);
    create_per_day_vector_name(&format!("{}{}", head, tail.replacen('T', "R", 1)))
}

/// Keyword part of a `KEYWORD:QUALIFIER` vector name.
pub fn vector_keyword(vector: &str) -> &str {
    vector.split_once(':').map_or(vector, |(keyword, _)| keyword)
}

/// Qualifier part (well, group, region number) of a `KEYWORD:QUALIFIER` vector name.
pub fn vector_qualifier(vector: &str) -> Option<&str> {
    vector.split_once(':').map(|(_, qualifier)| qualifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 8] = [
        "FOPT",
        "WOPT:OP_1",
        "PER_DAY_FOPT",
        "AVG_FOPT",
        "INTVL_",
        "_ADVG",
        "",
        "RPR:2",
    ];

    #[test]
    fn round_trip_per_day() {
        for name in NAMES {
            let derived = create_per_day_vector_name(name);
            assert!(is_per_day_vector(&derived));
            assert_eq!(name, get_cumulative_vector_name(&derived).unwrap());
        }
    }

    #[test]
    fn round_trip_per_interval() {
        for name in NAMES {
            let derived = create_per_interval_vector_name(name);
            assert!(is_per_interval_vector(&derived));
            assert_eq!(name, get_cumulative_vector_name(&derived).unwrap());
        }
    }

    #[test]
    fn prefix_characters_are_not_stripped() {
        // Stripping characters instead of a prefix would eat the leading "A" and "V".
        assert_eq!("AVGPR", get_cumulative_vector_name("AVG_AVGPR").unwrap());
        assert_eq!("INTVL_X", get_cumulative_vector_name("INTVL_INTVL_X").unwrap());
    }

    #[test]
    fn missing_prefix() {
        assert!(!is_per_interval_or_per_day_vector("FOPT"));
        assert!(matches!(
            get_cumulative_vector_name("FOPT"),
            Err(SummaryError::MissingDerivedPrefix { .. })
        ));
        assert!(matches!(
            get_cumulative_vector_name("PER_DAY_FOPT"),
            Err(SummaryError::MissingDerivedPrefix { .. })
        ));
    }

    #[test]
    fn rename_from_cumulative() {
        assert_eq!("AVG_FOPR", rename_vec_from_cum("FOPT", true));
        assert_eq!("AVG_WOPR:OP_1", rename_vec_from_cum("WOPT:OP_1", true));
        assert_eq!("AVG_GOPR:OP", rename_vec_from_cum("GOPT:OP", true));
        assert_eq!("AVG_TCPU", rename_vec_from_cum("TCPU", true));
        assert_eq!("INTVL_FOPT", rename_vec_from_cum("FOPT", false));
    }

    #[test]
    fn keyword_and_qualifier() {
        assert_eq!("WOPT", vector_keyword("WOPT:OP_1"));
        assert_eq!(Some("OP_1"), vector_qualifier("WOPT:OP_1"));
        assert_eq!("FOPT", vector_keyword("FOPT"));
        assert_eq!(None, vector_qualifier("FOPT"));
    }
}
