use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};

/// Maps IPs to their geo location based on MaxMind's GeoLite2 or GeoIP2
/// City database. The database file is read into memory once; lookups are
/// lock-free afterwards. The file should be refreshed on a regular basis
/// out of band.
pub struct GeoDb {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoDb {
    /// Load a GeoLite2/GeoIP2 City database from `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading geo database {}", path.display()))?;
        Self::from_bytes(bytes)
    }

    /// Build a reader from an in-memory database image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let reader =
            maxminddb::Reader::from_source(bytes).context("parsing geo database")?;
        Ok(GeoDb { reader })
    }

    /// Look up the lowercase ISO country code and English city name for `ip`.
    /// Invalid or unmappable IPs yield empty strings.
    pub fn country_code_and_city(&self, ip: &str) -> (String, String) {
        let ip_addr = match ip.parse::<IpAddr>() {
            Ok(ip_addr) => ip_addr,
            Err(_) => return (String::new(), String::new()),
        };

        let record = match self
            .reader
            .lookup(ip_addr)
            .ok()
            .and_then(|lookup| lookup.decode::<maxminddb::geoip2::City>().ok().flatten())
        {
            Some(record) => record,
            None => return (String::new(), String::new()),
        };

        let country_code = record
            .country
            .iso_code
            .map(|code| code.to_lowercase())
            .unwrap_or_default();
        let city = record
            .city
            .names
            .english
            .map(str::to_string)
            .unwrap_or_default();

        (country_code, city)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fails_for_missing_file() {
        assert!(GeoDb::open("/nonexistent/GeoLite2-City.mmdb").is_err());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(GeoDb::from_bytes(b"not an mmdb file".to_vec()).is_err());
    }
}
