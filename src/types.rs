use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tabled::Tabled;

/// Rows as they arrive from the API or an upload, before any rule runs.
///
/// Network rows keep their JSON types; uploaded rows only ever hold strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlaStatus {
    #[serde(rename = "No Prazo")]
    OnTime,
    #[serde(rename = "Fora do Prazo")]
    Overdue,
    #[serde(rename = "Crítico")]
    Critical,
}

impl SlaStatus {
    pub const ALL: [SlaStatus; 3] = [SlaStatus::Critical, SlaStatus::Overdue, SlaStatus::OnTime];

    pub fn label(&self) -> &'static str {
        match self {
            SlaStatus::OnTime => "No Prazo",
            SlaStatus::Overdue => "Fora do Prazo",
            SlaStatus::Critical => "Crítico",
        }
    }

    /// Accepts the display label in any case, with or without accents.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NO PRAZO" => Some(SlaStatus::OnTime),
            "FORA DO PRAZO" | "FORA" => Some(SlaStatus::Overdue),
            "CRÍTICO" | "CRITICO" => Some(SlaStatus::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Region {
    Litoral,
    Vale,
    Geral,
}

impl Region {
    pub fn label(&self) -> &'static str {
        match self {
            Region::Litoral => "Litoral",
            Region::Vale => "Vale",
            Region::Geral => "Geral",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LITORAL" => Some(Region::Litoral),
            "VALE" => Some(Region::Vale),
            "GERAL" => Some(Region::Geral),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Free-text columns that only feed the large-scale notice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentDetails {
    pub origin: Option<String>,
    pub primaries: Option<String>,
    pub cable: Option<String>,
    pub bds: Option<String>,
    pub anatel_prone: Option<String>,
    pub anatel_claimed: Option<String>,
}

/// One classified ocorrência.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub id: String,
    pub contract: String,
    pub opened_at: DateTime<FixedOffset>,
    pub at: Option<String>,
    pub cnl: Option<String>,
    pub city: Option<String>,
    pub affected: f64,
    pub technicians: u32,
    pub vip: bool,
    pub high_value: bool,
    pub b2b: bool,
    pub details: IncidentDetails,
    pub elapsed_seconds: i64,
    pub elapsed_hours: f64,
    pub elapsed_display: String,
    pub sla: SlaStatus,
    pub region: Region,
}

/// Rendered row of the incident table and of the list export.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct IncidentRow {
    #[serde(rename = "Ocorrência")]
    #[tabled(rename = "ID")]
    pub id: String,
    #[serde(rename = "Area")]
    #[tabled(rename = "Area")]
    pub region: String,
    #[serde(rename = "AT")]
    #[tabled(rename = "AT")]
    pub at: String,
    #[serde(rename = "Afetação")]
    #[tabled(rename = "Afet.")]
    pub affected: String,
    #[serde(rename = "Status SLA")]
    #[tabled(rename = "Status SLA")]
    pub sla: String,
    #[serde(rename = "Horas Corridas")]
    #[tabled(rename = "Tempo")]
    pub elapsed: String,
    #[serde(rename = "VIP")]
    #[tabled(rename = "VIP")]
    pub vip: String,
    #[serde(rename = "Cond. Alto Valor")]
    #[tabled(rename = "A.V")]
    pub high_value: String,
    #[serde(rename = "B2B")]
    #[tabled(rename = "B2B")]
    pub b2b: String,
    #[serde(rename = "Técnicos")]
    #[tabled(rename = "Técnicos")]
    pub technicians: u32,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq, Eq)]
pub struct ContractSummary {
    #[serde(rename = "Contrato")]
    #[tabled(rename = "CONTRATO")]
    pub contract: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "TOTAL")]
    pub total: usize,
    #[serde(rename = "No_Prazo")]
    #[tabled(rename = "NO PZ")]
    pub on_time: usize,
    #[serde(rename = "Fora_Prazo")]
    #[tabled(rename = "FORA PZ")]
    pub overdue: usize,
    #[serde(rename = "Grandes_Vultos")]
    #[tabled(rename = "G. VULTO")]
    pub large_scale: usize,
    #[serde(rename = "VIPs")]
    #[tabled(rename = "VIPS")]
    pub vip: usize,
    #[serde(rename = "Alto_Valor")]
    #[tabled(rename = "ALTO VALOR")]
    pub high_value: usize,
    #[serde(rename = "B2B")]
    #[tabled(rename = "B2B")]
    pub b2b: usize,
    #[serde(rename = "Criticos")]
    #[tabled(rename = "CRÍTICO >24H")]
    pub critical: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationalKpis {
    pub total: usize,
    pub without_technician: usize,
    pub critical: usize,
    pub attention: usize,
    pub on_time: usize,
    pub litoral: usize,
    pub vale: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterKpis {
    pub total: usize,
    pub large_scale: usize,
    pub on_time: usize,
    pub overdue: usize,
}

/// A KPI card flattened for table rendering.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiCard {
    #[tabled(rename = "Indicador")]
    pub label: String,
    #[tabled(rename = "Valor")]
    pub value: usize,
    #[tabled(rename = "%")]
    pub share: String,
}
