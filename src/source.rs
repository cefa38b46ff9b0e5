use crate::config::AppConfig;
use crate::types::RawTable;
use reqwest::blocking::Client;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Source field identifier → display label.
pub const FIELD_LABELS: [(&str, &str); 16] = [
    ("ocorrencia", "Ocorrência"),
    ("data_abertura", "Data Abertura"),
    ("contrato", "Contrato"),
    ("escritorio", "Escritório"),
    ("cnl", "CNL"),
    ("at", "AT"),
    ("cabo", "Cabo"),
    ("afetacao", "Afetação"),
    ("origem", "Origem"),
    ("primarias", "Primárias"),
    ("bd", "BD"),
    ("propenso_anatel", "Propensos - Anatel"),
    ("reclamado_anatel", "Reclamados - Anatel"),
    ("vip", "VIP"),
    ("b2b_avancado", "B2B_Value"),
    ("cond_alto_valor", "Cond. Alto Valor"),
];

pub const TECHNICIANS_SOURCE: &str = "tecnicos";
pub const TECHNICIANS_LABEL: &str = "Técnicos";
const RECORDS_KEY: &str = "ocorrencias";

/// Why a fetch produced no table. The `Display` text is what the console
/// shows next to the retry action.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Sem URL configurada.")]
    NotConfigured,
    #[error("Conexão: tempo limite excedido ({0:?}).")]
    Timeout(Duration),
    #[error("Conexão: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("Erro HTTP {0}")]
    Status(u16),
    #[error("Erro JSON.")]
    Json(#[source] serde_json::Error),
    #[error("JSON incompleto.")]
    MissingKey,
}

impl FetchError {
    /// Transport failures can be retried by the user; the others need a
    /// configuration or upstream fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_) | FetchError::Connection(_) | FetchError::Status(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ApiSource {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
    timeout: Duration,
}

impl ApiSource {
    pub fn new(url: impl Into<String>, headers: BTreeMap<String, String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            headers,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.api_url.clone(),
            config.api_headers.clone(),
            config.request_timeout,
        )
    }

    pub fn fetch(&self) -> Result<RawTable, FetchError> {
        if self.url.trim().is_empty() {
            return Err(FetchError::NotConfigured);
        }
        tracing::debug!(url = %self.url, "fetching ocorrências");

        let mut request = self.client.get(&self.url).timeout(self.timeout);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.as_u16() != 200 {
            tracing::warn!(status = status.as_u16(), "API answered with an error status");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().map_err(|e| self.transport_error(e))?;
        let table = parse_payload(&body)?;
        tracing::info!(rows = table.len(), "ocorrências fetched");
        Ok(table)
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        tracing::warn!(error = %e, "API request failed");
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Connection(e)
        }
    }
}

/// Decode the API envelope into a relabelled table.
pub fn parse_payload(body: &str) -> Result<RawTable, FetchError> {
    let json: Value = serde_json::from_str(body).map_err(FetchError::Json)?;
    let records = json
        .get(RECORDS_KEY)
        .and_then(Value::as_array)
        .ok_or(FetchError::MissingKey)?;

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let Some(obj) = record.as_object() else {
            tracing::debug!("skipping non-object record");
            continue;
        };
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        rows.push(obj.clone());
    }

    let mut table = RawTable { headers, rows };
    relabel(&mut table);
    Ok(table)
}

/// Rename source identifiers to display labels and collapse the technician
/// list into a count.
pub fn relabel(table: &mut RawTable) {
    let label_for = |key: &str| {
        FIELD_LABELS
            .iter()
            .find(|(src, _)| *src == key)
            .map(|(_, label)| label.to_string())
    };

    for header in table.headers.iter_mut() {
        if header.as_str() == TECHNICIANS_SOURCE {
            *header = TECHNICIANS_LABEL.to_string();
        } else if let Some(label) = label_for(header) {
            *header = label;
        }
    }
    dedup_preserving_order(&mut table.headers);

    for row in table.rows.iter_mut() {
        let old = std::mem::take(row);
        let mut renamed = Map::with_capacity(old.len());
        for (key, value) in old {
            if key == TECHNICIANS_SOURCE {
                renamed.insert(TECHNICIANS_LABEL.to_string(), technician_count(value));
            } else {
                let key = label_for(&key).unwrap_or(key);
                renamed.insert(key, value);
            }
        }
        *row = renamed;
    }
}

fn technician_count(value: Value) -> Value {
    match value {
        Value::Array(list) => Value::from(list.len()),
        Value::Null => Value::from(0),
        other => other,
    }
}

fn dedup_preserving_order(headers: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(headers.len());
    headers.retain(|h| {
        if seen.contains(h) {
            false
        } else {
            seen.push(h.clone());
            true
        }
    });
}
