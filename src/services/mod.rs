use std::{fmt, num::NonZeroUsize, str::FromStr};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    chunk::Chunk,
    config::{Config, ConfigError},
    table::{RawTable, TableError},
};

use self::transport::{RequestBody, Transport, TransportError};

pub mod amplify;
pub mod camp;
pub mod dbaasp;
pub mod stm;
pub mod transport;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Malformed response from {service}.")]
    Malformed {
        service: Service,
        #[source]
        source: TableError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown service '{0}'.")]
    Unknown(String),
}

/// The remote prediction services.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    Dbaasp,
    Stm,
    Camp,
    Amplify,
}

impl Service {
    pub const ALL: [Service; 4] = [Service::Dbaasp, Service::Stm, Service::Camp, Service::Amplify];

    pub fn name(&self) -> &'static str {
        match self {
            Service::Dbaasp => "dbaasp",
            Service::Stm => "stm",
            Service::Camp => "camp",
            Service::Amplify => "amplify",
        }
    }

    /// Byte budget per request, or `None` when the whole file goes in one request.
    pub fn chunk_limit(
        &self,
        config: &Config,
        params: &Params,
    ) -> Result<Option<NonZeroUsize>, ConfigError> {
        match self {
            Service::Stm => Ok(None),
            Service::Amplify if params.accession().is_some() => {
                config.chunking.genome_limit().map(Some)
            }
            _ => config.chunking.general_limit().map(Some),
        }
    }

    /// Labels of the tables one response holds. `camp` answers with one table per algorithm.
    pub fn table_labels(&self, config: &Config) -> Vec<Option<String>> {
        match self {
            Service::Camp => config.camp.algorithms.iter().cloned().map(Some).collect(),
            _ => vec![None],
        }
    }

    pub fn request(&self, config: &Config, chunk: &Chunk, params: &Params) -> ServiceRequest {
        match self {
            Service::Dbaasp => dbaasp::request(&config.dbaasp, chunk, params),
            Service::Stm => stm::request(&config.stm, chunk),
            Service::Camp => camp::request(&config.camp, chunk),
            Service::Amplify => amplify::request(&config.amplify, chunk, params),
        }
    }

    pub fn parse(&self, config: &Config, body: &str) -> Result<Vec<LabelledTable>, TableError> {
        match self {
            Service::Dbaasp => dbaasp::parse(body),
            Service::Stm => stm::parse(&config.stm, body),
            Service::Camp => camp::parse(&config.camp, body),
            Service::Amplify => amplify::parse(body),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Service {
    type Err = ServiceError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Service::ALL
            .into_iter()
            .find(|service| service.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ServiceError::Unknown(name.to_string()))
    }
}

/// Biological context narrowing a prediction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    /// Target strain for `dbaasp`. The configured default is used when absent.
    pub strain: Option<String>,
    /// Organism for `amplify`.
    pub organism: Option<String>,
    /// Genome accession for `amplify`.
    pub accession: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl Params {
    pub fn strain(&self) -> Option<&str> {
        non_empty(&self.strain)
    }

    pub fn organism(&self) -> Option<&str> {
        non_empty(&self.organism)
    }

    pub fn accession(&self) -> Option<&str> {
        non_empty(&self.accession)
    }

    /// Parameter part of the output file name.
    pub fn label(&self, service: Service, config: &Config) -> Option<String> {
        match service {
            Service::Dbaasp => Some(
                self.strain()
                    .unwrap_or(config.dbaasp.default_strain.as_str())
                    .to_string(),
            ),
            Service::Amplify => {
                let parts: Vec<&str> = [self.organism(), self.accession()]
                    .into_iter()
                    .flatten()
                    .collect();
                (!parts.is_empty()).then(|| parts.join("_"))
            }
            Service::Stm | Service::Camp => None,
        }
    }
}

/// A request ready to be sent.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceRequest {
    pub url: String,
    pub body: RequestBody,
    /// Identifiers were replaced by their 1-based positions.
    pub substituted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LabelledTable {
    pub label: Option<String>,
    pub table: RawTable,
}

impl LabelledTable {
    pub fn unlabelled(table: RawTable) -> Self {
        Self { label: None, table }
    }
}

/// What a service returned for one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse {
    pub tables: Vec<LabelledTable>,
    pub substituted: bool,
}

/// Send one chunk to a service.
///
/// A non-success status yields `Ok(None)` so the caller can carry on with the next chunk.
pub fn submit<T: Transport + ?Sized>(
    transport: &T,
    config: &Config,
    service: Service,
    chunk: &Chunk,
    params: &Params,
) -> Result<Option<RawResponse>, ServiceError> {
    let request = service.request(config, chunk, params);
    trace!(
        service = service.name(),
        url = request.url.as_str(),
        n_records = chunk.len(),
        substituted = request.substituted,
        "Prepared request."
    );

    let response = transport.post(&request.url, &request.body)?;
    debug!(
        service = service.name(),
        status = response.status,
        "Received response."
    );
    if !response.is_success() {
        warn!(
            service = service.name(),
            status = response.status,
            n_records = chunk.len(),
            "Service returned an error status, skipping chunk."
        );
        return Ok(None);
    }

    let tables = service
        .parse(config, &response.body)
        .map_err(|source| ServiceError::Malformed { service, source })?;
    Ok(Some(RawResponse {
        tables,
        substituted: request.substituted,
    }))
}
