//! Peer address resolution to country and autonomous system

use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const CITY_DB_FILE: &str = "GeoLite2-City.mmdb";
pub const ASN_DB_FILE: &str = "GeoLite2-ASN.mmdb";

#[derive(Error, Debug)]
#[error("geoip lookup for {ip} failed: {message}")]
pub struct GeoError {
    pub ip: IpAddr,
    pub message: String,
}

/// Country ISO code and `AS<number> <organization>` label, when known
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLookup {
    pub country: Option<String>,
    pub asn: Option<String>,
}

pub trait GeoResolver: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<GeoLookup, GeoError>;

    /// `false` suppresses every geo and ASN point
    fn is_configured(&self) -> bool;
}

/// Resolver used when no database is available
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl GeoResolver for NullResolver {
    fn lookup(&self, _ip: IpAddr) -> Result<GeoLookup, GeoError> {
        Ok(GeoLookup::default())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// MaxMind GeoLite2 City and ASN databases
pub struct MaxMindResolver {
    city: Option<Reader<Vec<u8>>>,
    asn: Option<Reader<Vec<u8>>>,
}

impl MaxMindResolver {
    /// Opens whichever of the two databases exist under `db_dir`
    pub fn open(db_dir: &Path) -> Self {
        let city = open_reader(&db_dir.join(CITY_DB_FILE));
        let asn = open_reader(&db_dir.join(ASN_DB_FILE));
        info!(
            dir = %db_dir.display(),
            city = city.is_some(),
            asn = asn.is_some(),
            "geoip databases"
        );
        Self { city, asn }
    }

    fn country(&self, ip: IpAddr) -> Result<Option<String>, MaxMindDBError> {
        let Some(reader) = &self.city else {
            return Ok(None);
        };
        match reader.lookup::<geoip2::City>(ip) {
            Ok(city) => Ok(city
                .country
                .and_then(|country| country.iso_code)
                .map(str::to_string)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn asn(&self, ip: IpAddr) -> Result<Option<String>, MaxMindDBError> {
        let Some(reader) = &self.asn else {
            return Ok(None);
        };
        match reader.lookup::<geoip2::Asn>(ip) {
            Ok(asn) => Ok(asn_label(
                asn.autonomous_system_number,
                asn.autonomous_system_organization,
            )),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl GeoResolver for MaxMindResolver {
    fn lookup(&self, ip: IpAddr) -> Result<GeoLookup, GeoError> {
        let error = |err: MaxMindDBError| GeoError {
            ip,
            message: err.to_string(),
        };
        Ok(GeoLookup {
            country: self.country(ip).map_err(error)?,
            asn: self.asn(ip).map_err(error)?,
        })
    }

    fn is_configured(&self) -> bool {
        self.city.is_some() || self.asn.is_some()
    }
}

fn open_reader(path: &Path) -> Option<Reader<Vec<u8>>> {
    if !path.exists() {
        return None;
    }
    match Reader::open_readfile(path) {
        Ok(reader) => Some(reader),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "geoip database unreadable");
            None
        }
    }
}

/// `AS<number> <organization>`; the organization may be missing
pub fn asn_label(number: Option<u32>, organization: Option<&str>) -> Option<String> {
    let number = number?;
    Some(match organization.map(str::trim).filter(|org| !org.is_empty()) {
        Some(org) => format!("AS{number} {org}"),
        None => format!("AS{number}"),
    })
}
