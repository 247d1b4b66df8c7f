//! CSV profile sheets.
//!
//! Two sheet layouts are understood and detected from the header row:
//!
//! - **flat**: one column per profile field (`name`, `destination`, `language`,
//!   `local_language`, `keywords`, `event`, `package`, optional `id`)
//! - **one-hot**: one boolean column per category value, e.g. `Dest_Paris`,
//!   `UserLang_English`, `LocalLang_French`, `Keyword_food`, `Event_Art Exhibit`,
//!   `Package_Shopping Enthusiast`
//!
//! Empty cells and `NaN` are treated as missing values.
//!
//! One-hot sheets without any `Keyword_` column carry interests in their `Event_`
//! columns, so the ticked events also become the profile keywords.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ProfileProvider, ProviderError, ProviderResult};
use crate::models::{Criterion, Profile};

const KEYWORD_PREFIX: &str = "Keyword_";

/// One-hot column prefixes and the field they fill.
const ONE_HOT_PREFIXES: [(&str, Criterion); 6] = [
    ("Dest_", Criterion::Destination),
    ("UserLang_", Criterion::Language),
    ("LocalLang_", Criterion::LocalLanguage),
    (KEYWORD_PREFIX, Criterion::Keywords),
    ("Event_", Criterion::Event),
    ("Package_", Criterion::Package),
];

/// Layout of a profile sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetLayout {
    Flat,
    OneHot,
}

/// Profile provider backed by a CSV sheet read wholesale into memory.
#[derive(Debug, Clone)]
pub struct CsvProfileProvider {
    source: String,
    layout: SheetLayout,
    profiles: Vec<Profile>,
}

impl CsvProfileProvider {
    /// Read and parse a CSV sheet from disk.
    ///
    /// # Errors
    /// Returns `ProviderError::Io` if the file cannot be read and
    /// `ProviderError::ParseError`/`LayoutError` if its content is unusable
    pub async fn from_file(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let path = path.into();
        let bytes = tokio::fs::read(&path).await.map_err(|source| ProviderError::Io {
            path: path.clone(),
            source,
        })?;
        let provider = Self::from_reader(bytes.as_slice(), &path.display().to_string())?;
        info!(
            "Loaded {} profiles from {} ({:?} layout)",
            provider.profiles.len(),
            path.display(),
            provider.layout
        );
        Ok(provider)
    }

    /// Parse a CSV sheet from any reader.
    ///
    /// # Arguments
    /// * `reader` - CSV content, header row first
    /// * `source` - Name used in logs and error messages
    pub fn from_reader<R: Read>(reader: R, source: &str) -> ProviderResult<Self> {
        let mut csv_reader = ::csv::ReaderBuilder::new()
            .flexible(true)
            .trim(::csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| ProviderError::ParseError(format!("{}: header row: {}", source, e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let layout = detect_layout(&headers)
            .ok_or_else(|| ProviderError::LayoutError(format!(
                "{}: expected a 'name' column or one-hot columns such as 'Dest_<city>'",
                source
            )))?;
        debug!("{}: detected {:?} layout with {} columns", source, layout, headers.len());

        let events_as_keywords = layout == SheetLayout::OneHot
            && !headers.iter().any(|h| h.starts_with(KEYWORD_PREFIX));
        if events_as_keywords {
            debug!("{}: no '{}' columns, events double as keywords", source, KEYWORD_PREFIX);
        }

        let mut profiles = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            // Fallback when the reader has no position: header is line 1.
            let fallback_line = index + 2;
            let record = record.map_err(|e| {
                let line = e
                    .position()
                    .map_or(fallback_line, |p| p.line() as usize);
                ProviderError::ParseError(format!("{}: line {}: {}", source, line, e))
            })?;
            let line = record
                .position()
                .map_or(fallback_line, |p| p.line() as usize);
            let cells: Vec<&str> = record.iter().collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            let profile = match layout {
                SheetLayout::Flat => flat_profile(&headers, &cells, line, source)?,
                SheetLayout::OneHot => {
                    let mut profile = one_hot_profile(&headers, &cells, index + 1, line, source)?;
                    if events_as_keywords && profile.keywords.is_none() {
                        profile.keywords = profile.event.clone();
                    }
                    profile
                }
            };
            profiles.push(profile);
        }

        Ok(Self {
            source: source.to_string(),
            layout,
            profiles,
        })
    }

    pub fn layout(&self) -> SheetLayout {
        self.layout
    }

    /// Path-like name of the sheet.
    pub fn source(&self) -> &Path {
        Path::new(&self.source)
    }
}

#[async_trait]
impl ProfileProvider for CsvProfileProvider {
    async fn fetch_profiles(&self) -> ProviderResult<Vec<Profile>> {
        Ok(self.profiles.clone())
    }

    async fn count_profiles(&self) -> ProviderResult<usize> {
        Ok(self.profiles.len())
    }

    fn name(&self) -> &str {
        &self.source
    }
}

/// Canonical form of a flat-layout header: `Local Language` -> `local_language`.
fn header_key(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

fn detect_layout(headers: &[String]) -> Option<SheetLayout> {
    let one_hot = headers
        .iter()
        .any(|h| ONE_HOT_PREFIXES.iter().any(|(prefix, _)| h.starts_with(prefix)));
    if one_hot {
        return Some(SheetLayout::OneHot);
    }
    headers
        .iter()
        .any(|h| header_key(h) == "name")
        .then_some(SheetLayout::Flat)
}

/// A cell value, or `None` for empty and NaN cells.
fn cell_value(cell: Option<&&str>) -> Option<String> {
    let cell = cell?.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(cell.to_string())
    }
}

fn is_truthy(cell: &str) -> bool {
    matches!(
        cell.trim().to_lowercase().as_str(),
        "1" | "1.0" | "true" | "yes" | "y"
    )
}

fn parse_id(cell: Option<String>, line: usize, source: &str) -> ProviderResult<Option<i64>> {
    cell.map(|raw| {
        raw.parse::<i64>().map_err(|_| {
            ProviderError::ParseError(format!("{}: line {}: invalid id '{}'", source, line, raw))
        })
    })
    .transpose()
}

fn flat_profile(headers: &[String], cells: &[&str], line: usize, source: &str) -> ProviderResult<Profile> {
    let mut profile = Profile::default();
    let mut name = None;
    for (header, cell) in headers.iter().zip(cells.iter()) {
        let value = cell_value(Some(cell));
        match header_key(header).as_str() {
            "id" => profile.id = parse_id(value, line, source)?,
            "name" => name = value,
            "destination" => profile.destination = value,
            "language" | "languages" => profile.language = value,
            "local_language" => profile.local_language = value,
            "keywords" | "keyword" | "interests" => profile.keywords = value,
            "event" => profile.event = value,
            "package" => profile.package = value,
            _ => {}
        }
    }
    profile.name = name.ok_or_else(|| {
        ProviderError::ParseError(format!("{}: line {}: missing name", source, line))
    })?;
    Ok(profile)
}

/// Build a profile from a one-hot row; `row` is the 1-based record number used
/// for the default name.
fn one_hot_profile(
    headers: &[String],
    cells: &[&str],
    row: usize,
    line: usize,
    source: &str,
) -> ProviderResult<Profile> {
    let mut profile = Profile::default();
    let mut fields: Vec<(Criterion, Vec<String>)> = Vec::new();

    for (header, cell) in headers.iter().zip(cells.iter()) {
        match header_key(header).as_str() {
            "id" => {
                profile.id = parse_id(cell_value(Some(cell)), line, source)?;
                continue;
            }
            "name" => {
                if let Some(name) = cell_value(Some(cell)) {
                    profile.name = name;
                }
                continue;
            }
            _ => {}
        }
        let Some((prefix, criterion)) = ONE_HOT_PREFIXES
            .iter()
            .find(|(prefix, _)| header.starts_with(prefix))
        else {
            continue;
        };
        if !is_truthy(cell) {
            continue;
        }
        let value = header[prefix.len()..].trim().to_string();
        match fields.iter_mut().find(|(c, _)| c == criterion) {
            Some((_, values)) => values.push(value),
            None => fields.push((*criterion, vec![value])),
        }
    }

    if profile.name.is_empty() {
        profile.name = format!("Buddy {}", row);
    }
    for (criterion, values) in fields {
        let joined = Some(values.join(","));
        match criterion {
            Criterion::Destination => profile.destination = joined,
            Criterion::Language => profile.language = joined,
            Criterion::LocalLanguage => profile.local_language = joined,
            Criterion::Keywords => profile.keywords = joined,
            Criterion::Event => profile.event = joined,
            Criterion::Package => profile.package = joined,
        }
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuddyRequest;
    use crate::scoring::{Scorer, WeightedScorer};

    const FLAT: &str = "\
id,name,destination,language,Local Language,keywords,event,package
1,Test One,Los Angeles,\"English,Spanish\",English,\"shopping,food,art\",City Tour,Solo Traveler Buddy
2,Test Thirteen,Lisbon,Portuguese,,NaN,,
";

    const ONE_HOT: &str = "\
Name,Dest_Paris,Dest_Rome,UserLang_English,LocalLang_French,Event_Art Exhibit,Event_City Tour,Package_Shopping Enthusiast
Claire,1,0,True,1.0,1,1,0
,0,1,0,0,0,0,1
";

    #[tokio::test]
    async fn test_flat_layout() {
        let provider = CsvProfileProvider::from_reader(FLAT.as_bytes(), "flat.csv").unwrap();
        assert_eq!(provider.layout(), SheetLayout::Flat);

        let profiles = provider.fetch_profiles().await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].id, Some(1));
        assert_eq!(profiles[0].language.as_deref(), Some("English,Spanish"));
        assert_eq!(profiles[0].local_language.as_deref(), Some("English"));
        assert!(profiles[1].local_language.is_none());
        assert!(profiles[1].keywords.is_none());
        assert!(profiles[1].event.is_none());
    }

    #[tokio::test]
    async fn test_one_hot_layout() {
        let provider = CsvProfileProvider::from_reader(ONE_HOT.as_bytes(), "onehot.csv").unwrap();
        assert_eq!(provider.layout(), SheetLayout::OneHot);

        let profiles = provider.fetch_profiles().await.unwrap();
        assert_eq!(profiles[0].name, "Claire");
        assert_eq!(profiles[0].destination.as_deref(), Some("Paris"));
        assert_eq!(profiles[0].language.as_deref(), Some("English"));
        assert_eq!(profiles[0].local_language.as_deref(), Some("French"));
        assert_eq!(profiles[0].event.as_deref(), Some("Art Exhibit,City Tour"));
        assert!(profiles[0].package.is_none());

        assert_eq!(profiles[1].name, "Buddy 2");
        assert_eq!(profiles[1].destination.as_deref(), Some("Rome"));
        assert_eq!(profiles[1].package.as_deref(), Some("Shopping Enthusiast"));
        assert!(profiles[1].language.is_none());
    }

    #[test]
    fn test_unknown_layout_rejected() {
        let result = CsvProfileProvider::from_reader("a,b\n1,2\n".as_bytes(), "odd.csv");
        assert!(matches!(result, Err(ProviderError::LayoutError(_))));
    }

    #[test]
    fn test_bad_id_names_the_line() {
        let sheet = "id,name\nabc,Test One\n";
        let err = CsvProfileProvider::from_reader(sheet.as_bytes(), "ids.csv").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_error_line_counts_multiline_cells() {
        let sheet = "id,name,keywords\n1,Test One,\"food,\nart\"\nabc,Test Two,\n";
        let err = CsvProfileProvider::from_reader(sheet.as_bytes(), "ids.csv").unwrap_err();
        assert!(err.to_string().contains("line 4"), "{}", err);
    }

    #[tokio::test]
    async fn test_one_hot_events_double_as_keywords() {
        let sheet = "\
Dest_Paris,UserLang_English,LocalLang_French,Event_food,Event_Art Exhibit,Package_Shopping Enthusiast
1,1,1,1,0,0
";
        let provider = CsvProfileProvider::from_reader(sheet.as_bytes(), "original.csv").unwrap();
        let profiles = provider.fetch_profiles().await.unwrap();
        assert_eq!(profiles[0].name, "Buddy 1");
        assert_eq!(profiles[0].keywords.as_deref(), Some("food"));

        let request = BuddyRequest {
            destination: Some("Paris".to_string()),
            language: Some("English".to_string()),
            local_language: Some("French".to_string()),
            keywords: Some("food,history".to_string()),
            ..BuddyRequest::default()
        };
        let breakdown = WeightedScorer::default().score(&request, &profiles[0]);
        assert!(breakdown.matched(Criterion::Keywords));
        assert_eq!(breakdown.total(), 50 + 30 + 20 + 10);
    }

    #[tokio::test]
    async fn test_one_hot_keyword_columns_take_precedence() {
        let sheet = "Name,Dest_Rome,Keyword_history,Event_City Tour\nMarco,1,1,1\n";
        let provider = CsvProfileProvider::from_reader(sheet.as_bytes(), "keywords.csv").unwrap();
        let profiles = provider.fetch_profiles().await.unwrap();
        assert_eq!(profiles[0].keywords.as_deref(), Some("history"));
        assert_eq!(profiles[0].event.as_deref(), Some("City Tour"));
    }

    #[test]
    fn test_missing_name_is_an_error() {
        let sheet = "name,destination\n,Paris\n";
        assert!(matches!(
            CsvProfileProvider::from_reader(sheet.as_bytes(), "names.csv"),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = CsvProfileProvider::from_file("/nonexistent/buddies.csv").await;
        assert!(matches!(result, Err(ProviderError::Io { .. })));
    }

    #[tokio::test]
    async fn test_limit_and_count() {
        let provider = CsvProfileProvider::from_reader(FLAT.as_bytes(), "flat.csv").unwrap();
        assert_eq!(provider.count_profiles().await.unwrap(), 2);
        assert_eq!(provider.fetch_profiles_limit(1).await.unwrap().len(), 1);
        assert_eq!(provider.name(), "flat.csv");
    }
}
