//! On-disk checkpoint for resuming an upload from another process

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use datapub_domain::continuation::{DeferralSignal, RequestDescriptor, ResumableTicket};
use datapub_domain::ports::Clock;
use datapub_http::{HttpIssuer, StatusRoute};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Everything needed to rebuild a `ResumableTicket`; never the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTicket {
    pub route: StatusRoute,
    pub signal: DeferralSignal,
    pub request: RequestDescriptor,
}

impl SavedTicket {
    pub fn capture<T>(route: StatusRoute, ticket: &ResumableTicket<T>) -> Self {
        Self {
            route,
            signal: ticket.signal().clone(),
            request: ticket.request().clone(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open ticket file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse ticket file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create ticket file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write ticket file {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write ticket file {}", path.display()))
    }

    /// Rebuild a live ticket polling through `issuer`, stamped by `clock`
    pub fn into_ticket<T, C>(self, issuer: &HttpIssuer, clock: C) -> ResumableTicket<T>
    where
        T: DeserializeOwned + 'static,
        C: Clock + Clone + 'static,
    {
        issuer.ticket_for(self.route, self.signal, self.request, clock)
    }
}
