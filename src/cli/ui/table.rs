use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::Style;

use super::painter::Painter;

/// Rounded two-column table of labelled fields.
#[derive(Debug)]
pub(crate) struct FieldTable<'a> {
    painter: &'a Painter,
    rows: Vec<[String; 2]>,
}

impl<'a> FieldTable<'a> {
    pub(crate) fn new(painter: &'a Painter) -> Self {
        Self {
            painter,
            rows: Vec::new(),
        }
    }

    /// Appends a row; the label is muted, the value is used as given.
    #[must_use]
    pub(crate) fn row(mut self, label: &str, value: String) -> Self {
        self.rows.push([self.painter.muted(label), value]);
        self
    }
}

impl Display for FieldTable<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(["field", "value"]);
        for row in &self.rows {
            builder.push_record(row.iter().map(String::as_str));
        }
        let mut table = builder.build();
        table.with(Style::rounded());
        write!(f, "{table}")
    }
}
