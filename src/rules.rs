//! Classification rules: every refresh turns a raw table into a fresh,
//! sorted list of [`Incident`]s. Nothing here keeps state between calls.

use crate::config::{AppConfig, SlaThresholds};
use crate::loader::CnlTable;
use crate::types::{Incident, IncidentDetails, RawTable, Region, SlaStatus};
use crate::util::{
    coerce_flag, format_hhmmss, parse_timestamp, value_f64, value_text, NumericRule,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// AT prefixes served by the coastal team of the monitored contract.
pub const LITORAL_PREFIXES: [&str; 20] = [
    "TG", "PG", "LZ", "MK", "MG", "PN", "AA", "BV", "FM", "RP", "AC", "FP", "BA", "TQ", "BO",
    "BU", "BC", "PJ", "PB", "MR",
];

const OPERATION_UTC_OFFSET_SECS: i32 = -3 * 3600;

/// Operation timezone (America/Sao_Paulo has no DST since 2019).
pub fn operation_offset() -> FixedOffset {
    FixedOffset::east_opt(OPERATION_UTC_OFFSET_SECS).unwrap_or(Utc.fix())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("nenhuma coluna de {0} encontrada")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractFilter {
    Only(String),
    AnyOf(Vec<String>),
}

impl ContractFilter {
    pub fn admits(&self, contract: &str) -> bool {
        match self {
            ContractFilter::Only(c) => c.trim().eq_ignore_ascii_case(contract),
            ContractFilter::AnyOf(list) => list.iter().any(|c| c.trim().eq_ignore_ascii_case(contract)),
        }
    }
}

/// Header names resolved against the candidate spellings seen in the wild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub contract: String,
    pub opened_at: String,
    pub id: Option<String>,
    pub cnl: Option<String>,
    pub at: Option<String>,
    pub technicians: Option<String>,
    pub affected: Option<String>,
    pub vip: Option<String>,
    pub high_value: Option<String>,
    pub b2b: Option<String>,
    pub origin: Option<String>,
    pub primaries: Option<String>,
    pub cable: Option<String>,
    pub bds: Option<String>,
    pub anatel_prone: Option<String>,
    pub anatel_claimed: Option<String>,
}

const CONTRACT_CANDIDATES: [&str; 3] = ["contrato", "escritório", "escritorio"];

fn header_lookup(headers: &[String]) -> HashMap<String, String> {
    let mut lookup: HashMap<String, String> = HashMap::new();
    for h in headers {
        lookup
            .entry(h.trim().to_lowercase())
            .or_insert_with(|| h.clone());
    }
    lookup
}

fn find_header(lookup: &HashMap<String, String>, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|c| lookup.get(*c).cloned())
}

/// The header holding the contract code, if any.
pub fn contract_column(headers: &[String]) -> Option<String> {
    find_header(&header_lookup(headers), &CONTRACT_CANDIDATES)
}

impl Schema {
    pub fn resolve(headers: &[String]) -> Result<Self, SchemaError> {
        let lookup = header_lookup(headers);

        Ok(Self {
            contract: find_header(&lookup, &CONTRACT_CANDIDATES)
                .ok_or(SchemaError::MissingColumn("contrato"))?,
            opened_at: find_header(&lookup, &["abertura", "data abertura", "data_abertura"])
                .ok_or(SchemaError::MissingColumn("abertura"))?,
            id: find_header(&lookup, &["ocorrência", "ocorrencia", "id"]),
            cnl: find_header(&lookup, &["cnl"]),
            at: find_header(&lookup, &["at", "area"]),
            technicians: find_header(&lookup, &["técnicos", "tecnicos"]),
            affected: find_header(&lookup, &["afetação", "afetacao"]),
            vip: find_header(&lookup, &["vip"]),
            high_value: find_header(&lookup, &["cond. alto valor", "cond_alto_valor"]),
            b2b: find_header(&lookup, &["b2b_value", "b2b_avancado", "b2b"]),
            origin: find_header(&lookup, &["origem"]),
            primaries: find_header(&lookup, &["primárias", "primarias"]),
            cable: find_header(&lookup, &["cabo"]),
            bds: find_header(&lookup, &["bd", "bds"]),
            anatel_prone: find_header(&lookup, &["propensos - anatel", "propenso_anatel"]),
            anatel_claimed: find_header(&lookup, &["reclamados - anatel", "reclamado_anatel"]),
        })
    }
}

/// Everything a classification run depends on besides the rows.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub now: DateTime<Utc>,
    pub local: FixedOffset,
    pub sla: SlaThresholds,
    pub monitored_contract: &'a str,
    pub cnl: Option<&'a CnlTable>,
}

impl<'a> RuleContext<'a> {
    pub fn from_config(config: &'a AppConfig, cnl: Option<&'a CnlTable>, now: DateTime<Utc>) -> Self {
        Self {
            now,
            local: operation_offset(),
            sla: config.sla,
            monitored_contract: &config.monitored_contract,
            cnl,
        }
    }
}

pub fn classify_sla(hours: f64, b2b: bool, t: &SlaThresholds) -> SlaStatus {
    let overdue = match (b2b, t.b2b_overdue_hours) {
        (true, Some(h)) => h,
        _ => t.overdue_hours,
    };
    if hours > t.critical_hours {
        SlaStatus::Critical
    } else if hours > overdue {
        SlaStatus::Overdue
    } else {
        SlaStatus::OnTime
    }
}

pub fn derive_region(contract: &str, at: Option<&str>, monitored: &str) -> Region {
    if !contract.eq_ignore_ascii_case(monitored) {
        return Region::Geral;
    }
    let Some(at) = at else {
        return Region::Vale;
    };
    let prefix = at.split('-').next().unwrap_or_default().trim().to_uppercase();
    if LITORAL_PREFIXES.contains(&prefix.as_str()) {
        Region::Litoral
    } else {
        Region::Vale
    }
}

fn cell<'r>(row: &'r Map<String, Value>, column: &Option<String>) -> Option<&'r Value> {
    column.as_ref().and_then(|c| row.get(c))
}

fn technician_count(v: Option<&Value>) -> u32 {
    match v {
        Some(Value::Array(list)) => list.len() as u32,
        other => value_f64(other)
            .filter(|n| *n > 0.0)
            .map(|n| n.min(u32::MAX as f64) as u32)
            .unwrap_or(0),
    }
}

/// Normalize, classify and sort the rows admitted by `filter`.
///
/// Rows whose opening time does not parse are dropped. A table without a
/// contract or opening column is a [`SchemaError`].
pub fn process(
    table: &RawTable,
    filter: &ContractFilter,
    ctx: &RuleContext<'_>,
) -> Result<Vec<Incident>, SchemaError> {
    let schema = Schema::resolve(&table.headers)?;
    let mut dropped = 0usize;
    let mut incidents = Vec::new();

    for row in &table.rows {
        let Some(contract) = value_text(row.get(&schema.contract)).map(|c| c.to_uppercase()) else {
            continue;
        };
        if !filter.admits(&contract) {
            continue;
        }

        let opened_at = match value_text(row.get(&schema.opened_at))
            .and_then(|raw| parse_timestamp(&raw, ctx.local))
        {
            Some(ts) => ts,
            None => {
                dropped += 1;
                continue;
            }
        };

        let elapsed_seconds = (ctx.now - opened_at.with_timezone(&Utc)).num_seconds();
        let elapsed_hours = elapsed_seconds as f64 / 3600.0;

        let b2b = coerce_flag(cell(row, &schema.b2b), NumericRule::Positive);
        let at = value_text(cell(row, &schema.at));
        let cnl = value_text(cell(row, &schema.cnl));
        let city = match (ctx.cnl, cnl.as_deref()) {
            (Some(table), Some(code)) => table.municipality(code).map(str::to_string),
            _ => None,
        };

        incidents.push(Incident {
            id: value_text(cell(row, &schema.id)).unwrap_or_else(|| "N/I".to_string()),
            region: derive_region(&contract, at.as_deref(), ctx.monitored_contract),
            contract,
            opened_at,
            at,
            cnl,
            city,
            affected: value_f64(cell(row, &schema.affected)).unwrap_or(0.0),
            technicians: technician_count(cell(row, &schema.technicians)),
            vip: coerce_flag(cell(row, &schema.vip), NumericRule::NonZero),
            high_value: coerce_flag(cell(row, &schema.high_value), NumericRule::NonZero),
            b2b,
            details: IncidentDetails {
                origin: value_text(cell(row, &schema.origin)),
                primaries: value_text(cell(row, &schema.primaries)),
                cable: value_text(cell(row, &schema.cable)),
                bds: value_text(cell(row, &schema.bds)),
                anatel_prone: value_text(cell(row, &schema.anatel_prone)),
                anatel_claimed: value_text(cell(row, &schema.anatel_claimed)),
            },
            elapsed_seconds,
            elapsed_hours,
            elapsed_display: format_hhmmss(elapsed_seconds),
            sla: classify_sla(elapsed_hours, b2b, &ctx.sla),
        });
    }

    if dropped > 0 {
        tracing::debug!(dropped, "rows without a parseable opening time were dropped");
    }
    incidents.sort_by(|a, b| {
        b.elapsed_hours
            .partial_cmp(&a.elapsed_hours)
            .unwrap_or(Ordering::Equal)
    });
    Ok(incidents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
    }

    fn opened_hours_ago(hours: i64) -> String {
        (now() - Duration::hours(hours)).to_rfc3339()
    }

    fn table(rows: Vec<Value>) -> RawTable {
        let mut headers: Vec<String> = Vec::new();
        let rows: Vec<Map<String, Value>> = rows
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        for r in &rows {
            for k in r.keys() {
                if !headers.contains(k) {
                    headers.push(k.clone());
                }
            }
        }
        RawTable { headers, rows }
    }

    fn ctx(cnl: Option<&CnlTable>) -> RuleContext<'_> {
        RuleContext {
            now: now(),
            local: operation_offset(),
            sla: SlaThresholds::default(),
            monitored_contract: "ABILITY_SJ",
            cnl,
        }
    }

    fn all() -> ContractFilter {
        ContractFilter::AnyOf(vec!["ABILITY_SJ".into(), "TEL_JI".into()])
    }

    #[test]
    fn thirty_hour_incident_is_critical() {
        let t = table(vec![json!({
            "Ocorrência": "OC1", "Contrato": "TEL_JI", "Data Abertura": opened_hours_ago(30)
        })]);
        let out = process(&t, &all(), &ctx(None)).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0].elapsed_hours - 30.0).abs() < 1e-9);
        assert_eq!(out[0].sla, SlaStatus::Critical);
        assert_eq!(out[0].elapsed_display, "30:00:00");
        assert_eq!(out[0].region, Region::Geral);
    }

    #[test]
    fn sla_thresholds_hold_at_the_edges() {
        let t = SlaThresholds::default();
        assert_eq!(classify_sla(24.01, false, &t), SlaStatus::Critical);
        assert_eq!(classify_sla(24.0, false, &t), SlaStatus::Overdue);
        assert_eq!(classify_sla(8.01, false, &t), SlaStatus::Overdue);
        assert_eq!(classify_sla(8.0, false, &t), SlaStatus::OnTime);
        assert_eq!(classify_sla(-2.0, false, &t), SlaStatus::OnTime);
        assert_eq!(classify_sla(5.0, true, &t), SlaStatus::Overdue);
        assert_eq!(classify_sla(4.0, true, &t), SlaStatus::OnTime);
        assert_eq!(classify_sla(30.0, true, &t), SlaStatus::Critical);

        let flat = SlaThresholds {
            b2b_overdue_hours: None,
            ..SlaThresholds::default()
        };
        assert_eq!(classify_sla(5.0, true, &flat), SlaStatus::OnTime);
    }

    #[test]
    fn region_is_total_over_the_monitored_contract() {
        assert_eq!(derive_region("ABILITY_SJ", Some("TG-123"), "ABILITY_SJ"), Region::Litoral);
        assert_eq!(derive_region("ABILITY_SJ", Some(" mr - 7"), "ABILITY_SJ"), Region::Litoral);
        assert_eq!(derive_region("ABILITY_SJ", Some("XX-999"), "ABILITY_SJ"), Region::Vale);
        assert_eq!(derive_region("ABILITY_SJ", None, "ABILITY_SJ"), Region::Vale);
        assert_eq!(derive_region("ABILITY_SJ", Some(""), "ABILITY_SJ"), Region::Vale);
        assert_eq!(derive_region("TEL_JI", Some("TG-123"), "ABILITY_SJ"), Region::Geral);
    }

    #[test]
    fn missing_required_columns_are_schema_errors() {
        let no_contract = table(vec![json!({"Data Abertura": opened_hours_ago(1)})]);
        assert_eq!(
            process(&no_contract, &all(), &ctx(None)),
            Err(SchemaError::MissingColumn("contrato"))
        );
        let no_opening = table(vec![json!({"Escritório": "TEL_JI"})]);
        assert_eq!(
            process(&no_opening, &all(), &ctx(None)),
            Err(SchemaError::MissingColumn("abertura"))
        );
    }

    #[test]
    fn header_resolution_ignores_case_and_spacing() {
        let headers = vec![" ESCRITÓRIO ".to_string(), "abertura".to_string(), "AREA".to_string()];
        let schema = Schema::resolve(&headers).unwrap();
        assert_eq!(schema.contract, " ESCRITÓRIO ");
        assert_eq!(schema.opened_at, "abertura");
        assert_eq!(schema.at.as_deref(), Some("AREA"));
        assert_eq!(schema.id, None);
    }

    #[test]
    fn filters_drops_and_sorts() {
        let t = table(vec![
            json!({"Contrato": "ability_sj ", "Data Abertura": opened_hours_ago(2), "AT": "TG-1"}),
            json!({"Contrato": "ABILITY_SJ", "Data Abertura": "not a date"}),
            json!({"Contrato": "ABILITY_SJ", "Data Abertura": opened_hours_ago(10), "AT": "SJC-4"}),
            json!({"Contrato": "TEL_JI", "Data Abertura": opened_hours_ago(50)}),
        ]);
        let only = ContractFilter::Only("ABILITY_SJ".into());
        let out = process(&t, &only, &ctx(None)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].elapsed_display, "10:00:00");
        assert_eq!(out[0].region, Region::Vale);
        assert_eq!(out[1].region, Region::Litoral);
        assert_eq!(out[1].contract, "ABILITY_SJ");

        let none = ContractFilter::AnyOf(vec![]);
        assert!(process(&t, &none, &ctx(None)).unwrap().is_empty());
    }

    #[test]
    fn naive_openings_are_read_in_operation_time() {
        // 09:00 in São Paulo is 12:00 UTC, i.e. exactly "now".
        let t = table(vec![json!({"Contrato": "TEL_JI", "Data Abertura": "2024-05-02 09:00:00"})]);
        let out = process(&t, &all(), &ctx(None)).unwrap();
        assert_eq!(out[0].elapsed_seconds, 0);
        assert_eq!(out[0].sla, SlaStatus::OnTime);
    }

    #[test]
    fn future_openings_clamp_the_display() {
        let t = table(vec![json!({"Contrato": "TEL_JI", "Data Abertura": opened_hours_ago(-2)})]);
        let out = process(&t, &all(), &ctx(None)).unwrap();
        assert!(out[0].elapsed_seconds < 0);
        assert_eq!(out[0].elapsed_display, "00:00:00");
        assert_eq!(out[0].sla, SlaStatus::OnTime);
    }

    #[test]
    fn flags_counts_and_city_are_coerced() {
        let cnl = CnlTable::from_pairs([("3550308", "São Paulo")]);
        let t = table(vec![json!({
            "Contrato": "TEL_JI",
            "Data Abertura": opened_hours_ago(5),
            "VIP": "s",
            "Cond. Alto Valor": "0",
            "B2B_Value": 3,
            "Técnicos": "2",
            "Afetação": "150",
            "CNL": 3550308.0
        })]);
        let out = process(&t, &all(), &ctx(Some(&cnl))).unwrap();
        let inc = &out[0];
        assert!(inc.vip);
        assert!(!inc.high_value);
        assert!(inc.b2b);
        assert_eq!(inc.sla, SlaStatus::Overdue);
        assert_eq!(inc.technicians, 2);
        assert_eq!(inc.affected, 150.0);
        assert_eq!(inc.city.as_deref(), Some("SÃO PAULO"));
        assert_eq!(inc.id, "N/I");
    }

    #[test]
    fn brazilian_number_formats_are_read_as_written() {
        let t = table(vec![
            json!({"Contrato": "TEL_JI", "Data Abertura": opened_hours_ago(3), "Afetação": "99,5"}),
            json!({"Contrato": "TEL_JI", "Data Abertura": opened_hours_ago(2), "Afetação": "1.500"}),
        ]);
        let out = process(&t, &all(), &ctx(None)).unwrap();
        assert_eq!(out[0].affected, 99.5);
        assert_eq!(out[1].affected, 1500.0);
    }
}
