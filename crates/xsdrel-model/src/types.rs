//! Type mapper: XSD simple types + facets -> SQL Server types + CHECKs
//! (spec.md §4.2).

use crate::model::{NVarCharLen, SqlType};

/// Facet values collected off an `xs:restriction`. Every field is optional;
/// an absent facet simply does not constrain the mapping.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub length: Option<u32>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub total_digits: Option<u32>,
    pub fraction_digits: Option<u32>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
}

/// Map an XSD builtin simple-type local name plus its facets to a
/// [`SqlType`]. `base` is expected to be the local name (namespace prefix
/// already stripped), e.g. `"string"`, `"decimal"`, `"unsignedInt"`.
pub fn map_simple_type(base: &str, facets: &Facets) -> SqlType {
    match base {
        "string" | "normalizedString" | "token" | "Name" | "NCName" | "ID" | "IDREF"
        | "language" => string_type(facets, 255),
        "anyURI" => string_type(facets, 512),
        "decimal" => decimal_type(facets),
        "integer" | "long" | "negativeInteger" | "nonNegativeInteger" | "nonPositiveInteger"
        | "positiveInteger" => SqlType::BigInt,
        "int" => SqlType::Int,
        "short" => SqlType::SmallInt,
        "byte" | "unsignedByte" => SqlType::TinyInt,
        "unsignedShort" | "unsignedInt" => SqlType::Int,
        "unsignedLong" => SqlType::BigInt,
        "boolean" => SqlType::Bit,
        "float" => SqlType::Real,
        "double" => SqlType::Float,
        "date" => SqlType::Date,
        "dateTime" => SqlType::DateTime2,
        "time" => SqlType::Time,
        "duration" => SqlType::NVarChar(NVarCharLen::Fixed(64)),
        _ => SqlType::NVarChar(NVarCharLen::Fixed(255)),
    }
}

fn string_type(facets: &Facets, default_len: u16) -> SqlType {
    let len = facets.length.or(facets.max_length);
    match len {
        Some(n) if n > 4000 => SqlType::NVarChar(NVarCharLen::Max),
        Some(n) => SqlType::NVarChar(NVarCharLen::Fixed(n as u16)),
        None => SqlType::NVarChar(NVarCharLen::Fixed(default_len)),
    }
}

fn decimal_type(facets: &Facets) -> SqlType {
    match (facets.total_digits, facets.fraction_digits) {
        (Some(p), Some(s)) => {
            let precision = p.clamp(1, 38) as u8;
            let scale = s.min(precision as u32) as u8;
            SqlType::Decimal { precision, scale }
        }
        (Some(p), None) => {
            let precision = p.clamp(1, 38) as u8;
            SqlType::Decimal { precision, scale: 0 }
        }
        (None, Some(s)) => {
            let precision = (s + 10).clamp(1, 38) as u8;
            SqlType::Decimal {
                precision,
                scale: s.min(precision as u32) as u8,
            }
        }
        (None, None) => SqlType::Decimal { precision: 18, scale: 6 },
    }
}

/// One CHECK predicate derived from a facet, before it is wrapped for
/// nullability and given a name (spec.md §4.2 / §3 invariant 8).
pub struct CheckPredicate {
    pub expression: String,
}

/// Derive the CHECK predicates implied by `facets` against a column named
/// `column` of type `sql_type`. `nullable` controls whether each predicate
/// is wrapped as `(col IS NULL OR (predicate))`.
pub fn facet_checks(column: &str, sql_type: &SqlType, nullable: bool, facets: &Facets) -> Vec<CheckPredicate> {
    let mut out = Vec::new();
    let col = format!("[{column}]");

    if let Some(n) = facets.length {
        out.push(format!("LEN({col}) = {n}"));
    }
    if let Some(n) = facets.min_length {
        out.push(format!("LEN({col}) >= {n}"));
    }
    if let Some(n) = facets.max_length {
        if matches!(sql_type, SqlType::NVarChar(NVarCharLen::Max)) {
            out.push(format!("LEN({col}) <= {n}"));
        }
    }
    if let Some(v) = &facets.min_inclusive {
        out.push(format!("{col} >= {v}"));
    }
    if let Some(v) = &facets.max_inclusive {
        out.push(format!("{col} <= {v}"));
    }
    if let Some(v) = &facets.min_exclusive {
        out.push(format!("{col} > {v}"));
    }
    if let Some(v) = &facets.max_exclusive {
        out.push(format!("{col} < {v}"));
    }

    out.into_iter()
        .map(|expr| {
            let expression = if nullable {
                format!("{col} IS NULL OR ({expr})")
            } else {
                expr
            };
            CheckPredicate { expression }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_default_length() {
        let f = Facets::default();
        assert_eq!(map_simple_type("string", &f), SqlType::NVarChar(NVarCharLen::Fixed(255)));
    }

    #[test]
    fn any_uri_default_length() {
        let f = Facets::default();
        assert_eq!(map_simple_type("anyURI", &f), SqlType::NVarChar(NVarCharLen::Fixed(512)));
    }

    #[test]
    fn string_max_length_over_4000_widens_to_max() {
        let f = Facets { max_length: Some(5000), ..Default::default() };
        assert_eq!(map_simple_type("string", &f), SqlType::NVarChar(NVarCharLen::Max));
    }

    #[test]
    fn decimal_default() {
        let f = Facets::default();
        assert_eq!(map_simple_type("decimal", &f), SqlType::Decimal { precision: 18, scale: 6 });
    }

    #[test]
    fn decimal_from_facets() {
        let f = Facets { total_digits: Some(10), fraction_digits: Some(2), ..Default::default() };
        assert_eq!(map_simple_type("decimal", &f), SqlType::Decimal { precision: 10, scale: 2 });
    }

    #[test]
    fn decimal_scale_only_derives_precision() {
        let f = Facets { fraction_digits: Some(4), ..Default::default() };
        assert_eq!(map_simple_type("decimal", &f), SqlType::Decimal { precision: 14, scale: 4 });
    }

    #[test]
    fn integer_kinds() {
        assert_eq!(map_simple_type("integer", &Facets::default()), SqlType::BigInt);
        assert_eq!(map_simple_type("short", &Facets::default()), SqlType::SmallInt);
        assert_eq!(map_simple_type("byte", &Facets::default()), SqlType::TinyInt);
        assert_eq!(map_simple_type("unsignedByte", &Facets::default()), SqlType::TinyInt);
        assert_eq!(map_simple_type("unsignedShort", &Facets::default()), SqlType::Int);
        assert_eq!(map_simple_type("unsignedInt", &Facets::default()), SqlType::Int);
        assert_eq!(map_simple_type("long", &Facets::default()), SqlType::BigInt);
    }

    #[test]
    fn other_builtins() {
        assert_eq!(map_simple_type("boolean", &Facets::default()), SqlType::Bit);
        assert_eq!(map_simple_type("float", &Facets::default()), SqlType::Real);
        assert_eq!(map_simple_type("double", &Facets::default()), SqlType::Float);
        assert_eq!(map_simple_type("date", &Facets::default()), SqlType::Date);
        assert_eq!(map_simple_type("dateTime", &Facets::default()), SqlType::DateTime2);
        assert_eq!(map_simple_type("time", &Facets::default()), SqlType::Time);
    }

    #[test]
    fn unknown_type_falls_back_to_nvarchar_255() {
        assert_eq!(map_simple_type("totallyMadeUp", &Facets::default()), SqlType::NVarChar(NVarCharLen::Fixed(255)));
    }

    #[test]
    fn length_facet_check_on_nullable_column() {
        let f = Facets { length: Some(8), ..Default::default() };
        let sql_type = SqlType::NVarChar(NVarCharLen::Fixed(8));
        let checks = facet_checks("K", &sql_type, true, &f);
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].expression, "[K] IS NULL OR (LEN([K]) = 8)");
    }

    #[test]
    fn max_length_check_only_emitted_for_nvarchar_max() {
        let f = Facets { max_length: Some(100), ..Default::default() };
        let fixed = SqlType::NVarChar(NVarCharLen::Fixed(100));
        assert!(facet_checks("K", &fixed, false, &f).is_empty());

        let maxed = SqlType::NVarChar(NVarCharLen::Max);
        let checks = facet_checks("K", &maxed, false, &f);
        assert_eq!(checks[0].expression, "LEN([K]) <= 100");
    }
}
