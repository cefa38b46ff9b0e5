use crate::cache::TtlCache;
use crate::config::AppConfig;
use crate::loader::{load_cnl, load_upload, CnlTable, LoadError};
use crate::rules::{process, ContractFilter, RuleContext, SchemaError};
use crate::source::{ApiSource, FetchError};
use crate::types::{Incident, RawTable};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("falha ao ler arquivo: {0}")]
    Load(#[from] LoadError),
    #[error("dados sem estrutura esperada: {0}")]
    Schema(#[from] SchemaError),
}

impl HubError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HubError::Fetch(e) if e.is_retryable())
    }
}

/// Where snapshots come from.
#[derive(Debug, Clone)]
pub enum DataOrigin {
    Api(ApiSource),
    Upload(PathBuf),
}

/// Snapshot and reference caches shared by every view of the session.
pub struct DataHub {
    config: AppConfig,
    origin: DataOrigin,
    snapshot: TtlCache<Arc<RawTable>>,
    reference: TtlCache<Arc<CnlTable>>,
}

impl DataHub {
    pub fn new(config: AppConfig, origin: DataOrigin) -> Self {
        Self {
            snapshot: TtlCache::new(config.api_cache_ttl),
            reference: TtlCache::new(config.reference_cache_ttl),
            config,
            origin,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The latest raw table, fetched at most once per cache window.
    pub fn snapshot(&mut self) -> Result<Arc<RawTable>, HubError> {
        let origin = &self.origin;
        self.snapshot.get_or_try_insert_with(|| -> Result<_, HubError> {
            let table = match origin {
                DataOrigin::Api(source) => source.fetch()?,
                DataOrigin::Upload(path) => load_upload(path)?.0,
            };
            Ok(Arc::new(table))
        })
    }

    /// The CNL lookup, or `None` when the reference file is unusable. A
    /// failed load is retried on the next call.
    pub fn reference(&mut self) -> Option<Arc<CnlTable>> {
        let path = self.config.reference_path.clone();
        let loaded = self
            .reference
            .get_or_try_insert_with(|| load_cnl(&path).map(Arc::new));
        match loaded {
            Ok(table) => Some(table),
            Err(e) => {
                tracing::warn!(error = %e, "CNL reference unavailable, cities will not resolve");
                None
            }
        }
    }

    /// Drop cached data so the next read goes back to the source.
    pub fn refresh(&mut self) {
        tracing::info!("cache cleared on request");
        self.snapshot.clear();
        self.reference.clear();
    }

    pub fn classify(
        &mut self,
        filter: &ContractFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Incident>, HubError> {
        let table = self.snapshot()?;
        let cnl = self.reference();
        let ctx = RuleContext::from_config(&self.config, cnl.as_deref(), now);
        Ok(process(&table, filter, &ctx)?)
    }
}
