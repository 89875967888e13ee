//! SQL dialect differences between the supported backends.

use dbbench_core::BackendKind;

/// SQL flavour a query provider renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// `None` for document backends.
    #[must_use]
    pub fn for_backend(backend: BackendKind) -> Option<Self> {
        match backend {
            BackendKind::Sqlite => Some(Self::Sqlite),
            BackendKind::Postgres => Some(Self::Postgres),
            BackendKind::Memory => None,
        }
    }

    /// Column type for instants. SQLite keeps them as sortable RFC 3339 text.
    #[must_use]
    pub fn timestamp_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "TEXT",
            Self::Postgres => "TIMESTAMPTZ",
        }
    }

    #[must_use]
    pub fn double_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "REAL",
            Self::Postgres => "DOUBLE PRECISION",
        }
    }

    /// Column type for a list of strings. SQLite stores a JSON array.
    #[must_use]
    pub fn text_array_type(&self) -> &'static str {
        match self {
            Self::Sqlite => "TEXT",
            Self::Postgres => "TEXT[]",
        }
    }

    /// Expression appending `value` to the array held in `column`.
    #[must_use]
    pub fn array_append(&self, column: &str, value: &str) -> String {
        match self {
            Self::Sqlite => format!("json_insert({column}, '$[#]', {value})"),
            Self::Postgres => format!("array_append({column}, {value})"),
        }
    }

    /// Suffix for `DROP TABLE` dropping dependants too.
    #[must_use]
    pub fn drop_suffix(&self) -> &'static str {
        match self {
            Self::Sqlite => "",
            Self::Postgres => " CASCADE",
        }
    }

    /// Rewrites `$N` placeholders into the dialect's positional form.
    ///
    /// Only a `$` followed by a digit is touched, so JSON paths such as
    /// `'$[#]'` survive.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        match self {
            Self::Postgres => template.to_string(),
            Self::Sqlite => {
                let mut out = String::with_capacity(template.len());
                let mut chars = template.chars().peekable();
                while let Some(c) = chars.next() {
                    if c == '$' && chars.peek().is_some_and(char::is_ascii_digit) {
                        out.push('?');
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        }
    }
}
