//! MaxMind database resolver
//!
//! Opens the country, city and ASN databases once at startup and serves
//! lookups for the [`Enricher`](crate::enrich::Enricher) until shutdown.

use crate::config::GeoIpConfig;
use crate::enrich::{AsnInfo, GeoLookup, Lookup};
use horang_common::{HorangError, Result};
use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

const ENGLISH: &str = "en";

/// The three GeoLite2 databases, memory-resident for the process lifetime
pub struct GeoIpResolver {
    country: Reader<Vec<u8>>,
    city: Reader<Vec<u8>>,
    asn: Reader<Vec<u8>>,
}

impl std::fmt::Debug for GeoIpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIpResolver")
            .field("country", &self.country.metadata.database_type)
            .field("city", &self.city.metadata.database_type)
            .field("asn", &self.asn.metadata.database_type)
            .finish()
    }
}

impl GeoIpResolver {
    /// Open all three databases; any missing or unreadable file is fatal
    pub fn open(config: &GeoIpConfig) -> Result<Self> {
        let resolver = Self {
            country: open_database(&config.country_db)?,
            city: open_database(&config.city_db)?,
            asn: open_database(&config.asn_db)?,
        };
        info!(
            country = %config.country_db.display(),
            city = %config.city_db.display(),
            asn = %config.asn_db.display(),
            "GeoIP databases opened"
        );
        Ok(resolver)
    }

    /// Release the databases
    pub fn close(self) {
        drop(self);
        info!("GeoIP databases closed");
    }
}

fn open_database(path: &Path) -> Result<Reader<Vec<u8>>> {
    Reader::open_readfile(path)
        .map_err(|e| HorangError::geo_database(format!("{}: {}", path.display(), e)))
}

/// Fold the "address absent" case into [`Lookup::NotFound`]
fn found<T>(result: std::result::Result<T, MaxMindDBError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
        Err(e) => Err(HorangError::geo_database(e.to_string())),
    }
}

impl GeoLookup for GeoIpResolver {
    fn country(&self, ip: IpAddr) -> Result<Lookup<String>> {
        let record = found(self.country.lookup::<geoip2::Country>(ip))?;
        Ok(record
            .and_then(|r| r.country)
            .and_then(|c| c.names)
            .and_then(|names| names.get(ENGLISH).map(|name| name.to_string()))
            .into())
    }

    fn city(&self, ip: IpAddr) -> Result<Lookup<String>> {
        let record = found(self.city.lookup::<geoip2::City>(ip))?;
        Ok(record
            .and_then(|r| r.city)
            .and_then(|c| c.names)
            .and_then(|names| names.get(ENGLISH).map(|name| name.to_string()))
            .into())
    }

    fn asn(&self, ip: IpAddr) -> Result<Lookup<AsnInfo>> {
        let record = found(self.asn.lookup::<geoip2::Asn>(ip))?;
        Ok(record
            .and_then(|r| {
                Some(AsnInfo {
                    organization: r.autonomous_system_organization?.to_string(),
                    number: r.autonomous_system_number?,
                })
            })
            .into())
    }
}
