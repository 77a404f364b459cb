use pg_escape::quote_identifier;
use std::fmt;

/// Schema qualified name of the source table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the name quoted for safe interpolation into SQL.
    pub fn as_quoted_identifier(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(
            TableName::new("public", "shipments").as_quoted_identifier(),
            "public.shipments"
        );
        assert_eq!(
            TableName::new("Ops", "ship\"ments").as_quoted_identifier(),
            r#""Ops"."ship""ments""#
        );
    }
}
