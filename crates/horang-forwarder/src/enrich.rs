//! IP-based record enrichment
//!
//! A record carrying an `ip` field gains four fields: `country`, `city`, `asn`
//! and `asn_number`. Each is either the resolved value or the string
//! `"Unknown"`. The three lookups are independent, so a city miss does not
//! blank out a resolved country.
//!
//! Misses never fail a record. Only a broken lookup capability (unreadable or
//! corrupt database) surfaces as an error, and that error is fatal to the
//! forwarder.

use horang_common::{Record, Result};
use serde_json::Value;
use std::net::IpAddr;

/// Field inspected for an address
pub const IP_FIELD: &str = "ip";

/// Value written for every field that could not be resolved
pub const UNKNOWN: &str = "Unknown";

pub const COUNTRY_FIELD: &str = "country";
pub const CITY_FIELD: &str = "city";
pub const ASN_FIELD: &str = "asn";
pub const ASN_NUMBER_FIELD: &str = "asn_number";

/// Outcome of one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// The address is valid but absent from the reference data
    NotFound,
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Lookup::NotFound, Lookup::Found)
    }
}

/// Autonomous system owning an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsnInfo {
    pub organization: String,
    pub number: u32,
}

/// Geographic and network lookups for an address
pub trait GeoLookup: Send + Sync {
    fn country(&self, ip: IpAddr) -> Result<Lookup<String>>;

    fn city(&self, ip: IpAddr) -> Result<Lookup<String>>;

    fn asn(&self, ip: IpAddr) -> Result<Lookup<AsnInfo>>;
}

/// Attaches lookup results to records
#[derive(Clone, Copy)]
pub struct Enricher<'a> {
    lookup: &'a dyn GeoLookup,
}

impl<'a> Enricher<'a> {
    pub fn new(lookup: &'a dyn GeoLookup) -> Self {
        Self { lookup }
    }

    /// Enrich one record; records without an `ip` are returned unchanged
    pub fn enrich(&self, mut record: Record) -> Result<Record> {
        let ip = match record.get(IP_FIELD) {
            None | Some(Value::Null) => return Ok(record),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(record),
            Some(Value::String(s)) => s.trim().parse::<IpAddr>().ok(),
            Some(_) => None,
        };

        let (country, city, asn) = match ip {
            Some(ip) => (
                self.lookup.country(ip)?,
                self.lookup.city(ip)?,
                self.lookup.asn(ip)?,
            ),
            None => (Lookup::NotFound, Lookup::NotFound, Lookup::NotFound),
        };

        record.insert(COUNTRY_FIELD.to_string(), name_or_unknown(country));
        record.insert(CITY_FIELD.to_string(), name_or_unknown(city));

        let (asn, asn_number) = match asn {
            Lookup::Found(info) => (Value::String(info.organization), Value::from(info.number)),
            Lookup::NotFound => (unknown(), unknown()),
        };
        record.insert(ASN_FIELD.to_string(), asn);
        record.insert(ASN_NUMBER_FIELD.to_string(), asn_number);

        Ok(record)
    }

    /// Enrich every record of a batch in order
    pub fn enrich_all(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        records.into_iter().map(|record| self.enrich(record)).collect()
    }
}

fn unknown() -> Value {
    Value::String(UNKNOWN.to_string())
}

fn name_or_unknown(lookup: Lookup<String>) -> Value {
    match lookup {
        Lookup::Found(name) => Value::String(name),
        Lookup::NotFound => unknown(),
    }
}
