use regex::Regex;
use std::sync::OnceLock;

/// Parses PostgreSQL constraint-violation messages into structured pieces.
///
/// Constraint names follow the conventional `table_column_suffix` shapes
/// (`credit_transactions_reference_key`, `bookings_class_id_fkey`), and the
/// DETAIL line carries `Key (column)=(value)` when available.
pub struct ConstraintParser;

struct Patterns {
    key_value: Regex,
    column_name: Regex,
    table_name: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        key_value: Regex::new(r"Key \(([^)]+)\)=\(([^)]*)\)").unwrap(),
        column_name: Regex::new(r#"column "([^"]+)""#).unwrap(),
        table_name: Regex::new(r#"(?:relation|table) "([^"]+)""#).unwrap(),
    })
}

/// Multi-word table names in the settlement schema; listed so that
/// `credit_transactions_reference_key` resolves to the right entity instead
/// of splitting on the first underscore.
const TABLE_PREFIXES: &[&str] = &[
    "credit_balances",
    "credit_transactions",
    "credit_pack_purchases",
    "credit_packs",
    "class_sessions",
    "instructor_payouts",
    "gateway_events",
    "bookings",
    "payments",
];

impl ConstraintParser {
    /// Extracts `(entity, field, value)` from a unique-violation message.
    ///
    /// The constraint name is preferred (`credit_packs_name_key` yields
    /// `credit_packs` / `name`); the duplicate value comes from the DETAIL
    /// line when present.
    pub fn parse_unique_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String, String)> {
        if let Some(constraint) = constraint_name
            && let Some((entity, field)) = Self::split_constraint_name(constraint)
        {
            let value = Self::key_value(message)
                .map(|(_, v)| v)
                .unwrap_or_else(|| "duplicate_value".to_string());
            return Some((entity, field, value));
        }

        let (field, value) = Self::key_value(message)?;
        let entity = Self::table(message).unwrap_or_else(|| "resource".to_string());
        Some((entity, field, value))
    }

    /// Extracts `(entity, field)` from a not-null-violation message.
    pub fn parse_not_null_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String)> {
        let field = Self::column(message)?;
        let entity = Self::table(message)
            .or_else(|| constraint_name.and_then(|c| Self::split_constraint_name(c).map(|(e, _)| e)))
            .unwrap_or_else(|| "resource".to_string());
        Some((entity, field))
    }

    /// Extracts `(entity, field, referenced_value)` from a foreign-key
    /// violation message.
    pub fn parse_foreign_key_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String, String)> {
        if let Some(constraint) = constraint_name
            && let Some((entity, field)) = Self::split_fkey_name(constraint)
        {
            let value = Self::key_value(message)
                .map(|(_, v)| v)
                .unwrap_or_else(|| "invalid_reference".to_string());
            return Some((entity, field, value));
        }

        let (field, value) = Self::key_value(message)?;
        let entity = Self::table(message).unwrap_or_else(|| "resource".to_string());
        Some((entity, field, value))
    }

    /// Extracts `(entity, field)` from a check-violation message.
    pub fn parse_check_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String)> {
        if let Some(constraint) = constraint_name
            && let Some(parsed) = Self::split_constraint_name(constraint)
        {
            return Some(parsed);
        }

        let field = Self::column(message)?;
        let entity = Self::table(message).unwrap_or_else(|| "resource".to_string());
        Some((entity, field))
    }

    /// Splits `table_field_suffix` constraint names.
    pub fn split_constraint_name(constraint: &str) -> Option<(String, String)> {
        for prefix in TABLE_PREFIXES {
            if let Some(rest) = constraint.strip_prefix(*prefix)
                && let Some(rest) = rest.strip_prefix('_')
            {
                let field = rest
                    .rsplit_once('_')
                    .map(|(f, _suffix)| f)
                    .unwrap_or(rest);
                return Some(((*prefix).to_string(), field.to_string()));
            }
        }

        let parts: Vec<&str> = constraint.split('_').collect();
        if parts.len() >= 3 {
            return Some((parts[0].to_string(), parts[1].to_string()));
        }
        None
    }

    /// `_fkey` names keep the full column (`bookings_class_id_fkey` yields
    /// `class_id`, not `class`).
    fn split_fkey_name(constraint: &str) -> Option<(String, String)> {
        let without = constraint.strip_suffix("_fkey")?;
        for prefix in TABLE_PREFIXES {
            if let Some(rest) = without.strip_prefix(*prefix).and_then(|r| r.strip_prefix('_')) {
                return Some(((*prefix).to_string(), rest.to_string()));
            }
        }
        let (entity, field) = without.split_once('_')?;
        Some((entity.to_string(), field.to_string()))
    }

    fn key_value(message: &str) -> Option<(String, String)> {
        patterns()
            .key_value
            .captures(message)
            .map(|c| (c[1].to_string(), c[2].to_string()))
    }

    fn column(message: &str) -> Option<String> {
        patterns()
            .column_name
            .captures(message)
            .map(|c| c[1].to_string())
    }

    fn table(message: &str) -> Option<String> {
        patterns()
            .table_name
            .captures(message)
            .map(|c| c[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_resolves_schema_tables() {
        let message = "duplicate key value violates unique constraint \
                       \"credit_transactions_reference_key\"\n\
                       DETAIL: Key (reference_id)=(bk-42) already exists.";
        let parsed = ConstraintParser::parse_unique_violation(
            message,
            Some("credit_transactions_reference_key"),
        );
        assert_eq!(
            parsed,
            Some((
                "credit_transactions".to_string(),
                "reference".to_string(),
                "bk-42".to_string()
            ))
        );
    }

    #[test]
    fn unique_violation_falls_back_to_message() {
        let message = "duplicate key value violates unique constraint\n\
                       DETAIL: Key (gateway_payment_id)=(pi_123) already exists \
                       in relation \"payments\".";
        let parsed = ConstraintParser::parse_unique_violation(message, None);
        assert_eq!(
            parsed,
            Some((
                "payments".to_string(),
                "gateway_payment_id".to_string(),
                "pi_123".to_string()
            ))
        );
    }

    #[test]
    fn not_null_violation_extracts_column() {
        let message = "null value in column \"user_id\" of relation \
                       \"bookings\" violates not-null constraint";
        let parsed = ConstraintParser::parse_not_null_violation(message, None);
        assert_eq!(parsed, Some(("bookings".to_string(), "user_id".to_string())));
    }

    #[test]
    fn foreign_key_violation_parses_constraint_name() {
        let message = "insert or update on table \"bookings\" violates foreign \
                       key constraint \"bookings_class_id_fkey\"\n\
                       DETAIL: Key (class_id)=(0a1b) is not present in table \
                       \"class_sessions\".";
        let parsed =
            ConstraintParser::parse_foreign_key_violation(message, Some("bookings_class_id_fkey"));
        assert_eq!(
            parsed,
            Some((
                "bookings".to_string(),
                "class_id".to_string(),
                "0a1b".to_string()
            ))
        );
    }

    #[test]
    fn check_violation_uses_known_prefixes() {
        let parsed = ConstraintParser::parse_check_violation(
            "new row for relation \"credit_balances\" violates check \
             constraint \"credit_balances_balance_check\"",
            Some("credit_balances_balance_check"),
        );
        assert_eq!(
            parsed,
            Some(("credit_balances".to_string(), "balance".to_string()))
        );
    }

    #[test]
    fn short_constraint_names_are_rejected() {
        assert_eq!(ConstraintParser::split_constraint_name("pk"), None);
    }
}
