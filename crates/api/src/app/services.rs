//! Infrastructure wiring: picks the record source and ledger transport from
//! configuration and builds the process-wide dispatcher and runner.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use omiesync_infra::dispatch::{Dispatcher, DispatcherStats};
use omiesync_infra::omie::{InMemoryLedger, LedgerTransport, OmieHttpClient, TransportError};
use omiesync_infra::source::{
    InMemoryRecordSource, PostgresRecordSource, RecordSource, SourceError,
};
use omiesync_infra::{AppConfig, SourceConfig, SyncRunner};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("record source setup failed: {0}")]
    Source(#[from] SourceError),
    #[error("ledger transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub runner: SyncRunner,
}

impl AppServices {
    pub fn new(runner: SyncRunner) -> Self {
        Self { runner }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.runner.dispatcher()
    }

    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher().stats()
    }
}

pub fn build_services(config: &AppConfig) -> Result<AppServices, ServiceError> {
    let transport: Arc<dyn LedgerTransport> = if config.omie.dry_run {
        warn!("OMIE_DRY_RUN set; remote calls go to the in-memory ledger");
        Arc::new(InMemoryLedger::new())
    } else {
        Arc::new(OmieHttpClient::new(&config.omie)?)
    };

    let source: Arc<dyn RecordSource> = match &config.source {
        SourceConfig::Postgres { database_url, view } => {
            Arc::new(PostgresRecordSource::connect_lazy(database_url, view.clone())?)
        }
        SourceConfig::Memory => {
            warn!("SOURCE=memory; runs will find no records");
            Arc::new(InMemoryRecordSource::default())
        }
    };

    let dispatcher = Dispatcher::new(transport, config.dispatcher.clone());
    let runner = SyncRunner::new(source, dispatcher, config.accounts.clone());
    Ok(AppServices::new(runner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_with_memory_source_wires_up() {
        let config = AppConfig::from_lookup(|k| match k {
            "SOURCE" => Some("memory".to_string()),
            "OMIE_DRY_RUN" => Some("true".to_string()),
            "DISPATCH_INTERVAL_MS" => Some("10".to_string()),
            _ => None,
        })
        .unwrap();

        let services = build_services(&config).unwrap();
        assert_eq!(services.dispatcher().config().interval.as_millis(), 10);
        assert_eq!(services.dispatcher().pending(), 0);

        let summary = services.runner.run().await.unwrap();
        assert_eq!(summary.total_registros_encontrados, 0);
    }

    #[tokio::test]
    async fn invalid_view_name_fails_wiring() {
        let config = AppConfig::from_lookup(|k| match k {
            "DATABASE_URL" => Some("postgres://localhost/erp".to_string()),
            "SOURCE_VIEW" => Some("vw; drop table x".to_string()),
            "OMIE_DRY_RUN" => Some("true".to_string()),
            _ => None,
        })
        .unwrap();

        assert!(matches!(
            build_services(&config),
            Err(ServiceError::Source(SourceError::InvalidViewName(_)))
        ));
    }
}
