//! Subscriber lookups backed by the RadioID user database.
//!
//! The database is a CSV export of every registered DMR id. It is cached on
//! disk and refreshed at startup once it goes stale.
//! Lookups never fail: an unknown station simply has no name.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{info, warn};

/// Default download location of the RadioID user database.
pub const RADIOID_CSV_URL: &str = "https://radioid.net/static/user.csv";

/// Errors raised while loading the user database.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),
}

/// A registered DMR user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriber {
    pub id: u32,
    pub callsign: String,
    pub first_name: String,
    pub city: String,
    pub country: String,
}

/// Resolves stations to subscriber records.
///
/// Implementations must answer quickly and without blocking: they are called
/// for every matched event.
pub trait NameLookup {
    /// Look up a station by callsign.
    fn by_callsign(&self, callsign: &str) -> Option<&Subscriber>;

    /// Look up a station by DMR id.
    fn by_id(&self, _id: u32) -> Option<&Subscriber> {
        None
    }
}

/// A lookup that knows nobody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl NameLookup for NoLookup {
    fn by_callsign(&self, _callsign: &str) -> Option<&Subscriber> {
        None
    }
}

/// Settings for locating and refreshing the user database.
#[derive(Debug, Clone)]
pub struct LookupSettings {
    /// Where to download the CSV from.
    pub csv_url: String,

    /// Local cache file.
    pub cache_path: PathBuf,

    /// Re-download once the cache is older than this.
    pub max_age: Duration,

    /// Download timeout.
    pub timeout: Duration,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            csv_url: RADIOID_CSV_URL.to_string(),
            cache_path: default_cache_path(),
            max_age: Duration::from_secs(14 * 24 * 60 * 60),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Returns the default cache location for the user database.
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bm-lastheard/user.csv")
}

/// One row of the RadioID CSV export.
#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(rename = "RADIO_ID", default)]
    radio_id: String,
    #[serde(rename = "CALLSIGN", default)]
    callsign: String,
    #[serde(rename = "FIRST_NAME", default)]
    first_name: String,
    #[serde(rename = "CITY", default)]
    city: String,
    #[serde(rename = "COUNTRY", default)]
    country: String,
}

/// In-memory RadioID database indexed by DMR id and callsign.
#[derive(Debug, Default)]
pub struct RadioIdDatabase {
    by_id: HashMap<u32, Subscriber>,
    by_callsign: HashMap<String, u32>,
}

impl RadioIdDatabase {
    /// Parse a RadioID CSV export.
    ///
    /// Rows without an id or callsign are skipped, as are rows that fail to
    /// decode. When several ids share a callsign the first one wins.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LookupError> {
        let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut db = Self::default();

        for row in csv.deserialize::<UserRow>() {
            let Ok(row) = row else {
                continue;
            };
            let Ok(id) = row.radio_id.trim().parse::<u32>() else {
                continue;
            };
            let callsign = row.callsign.trim().to_string();
            if callsign.is_empty() {
                continue;
            }

            db.by_callsign.entry(callsign.clone()).or_insert(id);
            db.by_id.insert(
                id,
                Subscriber {
                    id,
                    callsign,
                    first_name: row.first_name.trim().to_string(),
                    city: row.city.trim().to_string(),
                    country: row.country.trim().to_string(),
                },
            );
        }

        Ok(db)
    }

    /// Parse a cached CSV file.
    pub fn from_path(path: &Path) -> Result<Self, LookupError> {
        let file = fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load the database, downloading a fresh copy if the cache is stale.
    ///
    /// A failed download falls back to the stale cache. Returns an error only
    /// when no usable copy exists at all.
    pub async fn load(settings: &LookupSettings) -> Result<Self, LookupError> {
        if is_stale(&settings.cache_path, settings.max_age) {
            info!("Downloading RadioID user database...");
            match download(settings).await {
                Ok(bytes) => info!("Database downloaded ({} bytes)", bytes),
                Err(e) if settings.cache_path.exists() => {
                    warn!("Failed to download database, using stale copy: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let db = Self::from_path(&settings.cache_path)?;
        info!("Loaded {} callsigns", db.len());
        Ok(db)
    }

    /// Number of subscribers loaded.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl NameLookup for RadioIdDatabase {
    fn by_callsign(&self, callsign: &str) -> Option<&Subscriber> {
        self.by_callsign
            .get(callsign)
            .and_then(|id| self.by_id.get(id))
    }

    fn by_id(&self, id: u32) -> Option<&Subscriber> {
        self.by_id.get(&id)
    }
}

/// Whether the cache file is missing or older than `max_age`.
pub fn is_stale(path: &Path, max_age: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return true,
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > max_age,
        // Modified in the future; trust it.
        Err(_) => false,
    }
}

/// Download the CSV into the cache. Returns the number of bytes written.
async fn download(settings: &LookupSettings) -> Result<usize, LookupError> {
    let client = reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()?;
    let response = client.get(&settings.csv_url).send().await?;
    if !response.status().is_success() {
        return Err(LookupError::Status(response.status().as_u16()));
    }
    let body = response.bytes().await?;

    if let Some(parent) = settings.cache_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&settings.cache_path, &body)?;
    Ok(body.len())
}
