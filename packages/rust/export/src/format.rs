//! Supported output formats.

use std::fmt;
use std::str::FromStr;

use cleanbook_shared::CleanbookError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExportFormat {
    Html,
    Json,
    Markdown,
    Csv,
    Xml,
    Opml,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 6] = [
        Self::Html,
        Self::Json,
        Self::Markdown,
        Self::Csv,
        Self::Xml,
        Self::Opml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Opml => "opml",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            other => other.as_str(),
        }
    }

    /// Parse a list of names, dropping duplicates and keeping first-seen order.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>, CleanbookError> {
        let mut formats = Vec::new();
        for name in names {
            let format: Self = name.as_ref().parse()?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        Ok(formats)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = CleanbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            "opml" => Ok(Self::Opml),
            other => Err(CleanbookError::validation(format!(
                "unknown export format '{other}' (expected one of html, json, markdown, csv, xml, opml)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("MD".parse::<ExportFormat>().expect("md"), ExportFormat::Markdown);
        assert_eq!(" opml ".parse::<ExportFormat>().expect("opml"), ExportFormat::Opml);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn list_is_deduplicated_in_order() {
        let formats = ExportFormat::parse_list(&["json", "html", "json"]).expect("list");
        assert_eq!(formats, vec![ExportFormat::Json, ExportFormat::Html]);
        assert_eq!(ExportFormat::Markdown.extension(), "md");
    }
}
