use std::{net::IpAddr, path::Path};

use anyhow::Context as _;

/// City/country pair attached to the second overlay line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub city: String,
    pub country: String,
}

impl Location {
    pub fn unknown() -> Self {
        Self {
            city: "Unknown".to_owned(),
            country: "Unknown".to_owned(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.city, self.country)
    }
}

/// Look up `ip` in the GeoLite2-City database at `db_path`.
///
/// The reader handle is scoped to this call. Every failure mode (bad IP,
/// missing database, absent record) degrades to `Unknown, Unknown`; the
/// caller never sees an error. One attempt, no retry.
pub fn resolve(db_path: &Path, ip: &str) -> Location {
    match lookup(db_path, ip) {
        Ok(loc) => loc,
        Err(e) => {
            tracing::warn!(ip, error = %e, "geoip lookup failed");
            Location::unknown()
        }
    }
}

fn lookup(db_path: &Path, ip: &str) -> anyhow::Result<Location> {
    let addr: IpAddr = ip.parse().with_context(|| format!("parse ip '{ip}'"))?;
    let reader = maxminddb::Reader::open_readfile(db_path)
        .with_context(|| format!("open geoip database '{}'", db_path.display()))?;
    let record: maxminddb::geoip2::City = reader
        .lookup(addr)
        .with_context(|| format!("no city record for {addr}"))?;

    let city = record
        .city
        .as_ref()
        .and_then(|c| c.names.as_ref())
        .and_then(|n| n.get("en"))
        .map_or_else(|| "Unknown".to_owned(), |s| (*s).to_owned());
    let country = record
        .country
        .as_ref()
        .and_then(|c| c.names.as_ref())
        .and_then(|n| n.get("en"))
        .map_or_else(|| "Unknown".to_owned(), |s| (*s).to_owned());

    Ok(Location { city, country })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_degrades_to_unknown() {
        let loc = resolve(Path::new("/nonexistent/GeoLite2-City.mmdb"), "1.2.3.4");
        assert_eq!(loc, Location::unknown());
    }

    #[test]
    fn garbage_ip_degrades_to_unknown() {
        let loc = resolve(Path::new("/nonexistent/GeoLite2-City.mmdb"), "not-an-ip");
        assert_eq!(loc, Location::unknown());
    }

    #[test]
    fn display_joins_city_and_country() {
        let loc = Location {
            city: "Paris".to_owned(),
            country: "France".to_owned(),
        };
        assert_eq!(loc.to_string(), "Paris, France");
    }
}
