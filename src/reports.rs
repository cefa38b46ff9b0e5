use crate::auth::Session;
use crate::rules::{contract_column, operation_offset};
use crate::types::{
    ClusterKpis, ContractSummary, Incident, IncidentRow, KpiCard, OperationalKpis, RawTable,
    Region, SlaStatus,
};
use crate::util::{flag_label, percent, value_text};
use std::collections::{BTreeSet, HashMap};

/// Fallback municipality by AT prefix when the CNL lookup has no match.
const AT_CITIES: [(&str, &str); 9] = [
    ("SJC", "SÃO JOSÉ DOS CAMPOS"),
    ("JAC", "JACAREÍ"),
    ("TAU", "TAUBATÉ"),
    ("GUA", "GUARATINGUETÁ"),
    ("PNO", "PINDAMONHANGABA"),
    ("CAR", "CARAGUATATUBA"),
    ("UBA", "UBATUBA"),
    ("SBO", "SÃO SEBASTIÃO"),
    ("ILH", "ILHABELA"),
];

pub fn is_large_scale(incident: &Incident, threshold: f64) -> bool {
    incident.affected >= threshold
}

/// Every contract code present in the snapshot, upper-cased and sorted.
pub fn present_contracts(table: &RawTable) -> Vec<String> {
    let Some(column) = contract_column(&table.headers) else {
        return Vec::new();
    };
    let present: BTreeSet<String> = table
        .rows
        .iter()
        .filter_map(|row| value_text(row.get(&column)))
        .map(|c| c.to_uppercase())
        .collect();
    present.into_iter().collect()
}

/// Main contracts that actually appear in the snapshot, in configured order.
pub fn available_contracts(table: &RawTable, main: &[String]) -> Vec<String> {
    let present = present_contracts(table);
    main.iter()
        .filter(|c| present.contains(c))
        .cloned()
        .collect()
}

/// Per-contract roll-up, largest contract first.
///
/// `on_time + overdue == total` for every row: anything not on time is
/// overdue, critical included.
pub fn contract_summary(
    incidents: &[Incident],
    contracts: Option<&[String]>,
    large_scale_threshold: f64,
) -> Vec<ContractSummary> {
    let mut map: HashMap<&str, ContractSummary> = HashMap::new();
    for inc in incidents {
        if let Some(allowed) = contracts {
            if !allowed.iter().any(|c| c == &inc.contract) {
                continue;
            }
        }
        let e = map.entry(inc.contract.as_str()).or_insert_with(|| ContractSummary {
            contract: inc.contract.clone(),
            total: 0,
            on_time: 0,
            overdue: 0,
            large_scale: 0,
            vip: 0,
            high_value: 0,
            b2b: 0,
            critical: 0,
        });
        e.total += 1;
        if inc.sla == SlaStatus::OnTime {
            e.on_time += 1;
        } else {
            e.overdue += 1;
        }
        if inc.sla == SlaStatus::Critical {
            e.critical += 1;
        }
        if is_large_scale(inc, large_scale_threshold) {
            e.large_scale += 1;
        }
        e.vip += usize::from(inc.vip);
        e.high_value += usize::from(inc.high_value);
        e.b2b += usize::from(inc.b2b);
    }
    let mut rows: Vec<ContractSummary> = map.into_values().collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.contract.cmp(&b.contract)));
    rows
}

fn count(incidents: &[Incident], pred: impl Fn(&Incident) -> bool) -> usize {
    incidents.iter().filter(|&i| pred(i)).count()
}

pub fn operational_kpis(incidents: &[Incident]) -> OperationalKpis {
    OperationalKpis {
        total: incidents.len(),
        without_technician: count(incidents, |i| i.technicians == 0),
        critical: count(incidents, |i| i.sla == SlaStatus::Critical),
        attention: count(incidents, |i| i.sla == SlaStatus::Overdue),
        on_time: count(incidents, |i| i.sla == SlaStatus::OnTime),
        litoral: count(incidents, |i| i.region == Region::Litoral),
        vale: count(incidents, |i| i.region == Region::Vale),
    }
}

pub fn kpi_cards(kpis: &OperationalKpis, with_regions: bool) -> Vec<KpiCard> {
    let card = |label: &str, value: usize, share: bool| KpiCard {
        label: label.to_string(),
        value,
        share: if share { percent(value, kpis.total) } else { String::new() },
    };
    let mut cards = vec![
        card("Total", kpis.total, false),
        card("S/ Técnico", kpis.without_technician, true),
        card("Crítico (>24h)", kpis.critical, true),
        card("Fora do Prazo", kpis.attention, true),
        card("No Prazo", kpis.on_time, true),
    ];
    if with_regions {
        cards.push(card("Litoral", kpis.litoral, false));
        cards.push(card("Vale", kpis.vale, false));
    }
    cards
}

pub fn cluster_kpis(incidents: &[Incident], large_scale_threshold: f64) -> ClusterKpis {
    let on_time = count(incidents, |i| i.sla == SlaStatus::OnTime);
    ClusterKpis {
        total: incidents.len(),
        large_scale: count(incidents, |i| is_large_scale(i, large_scale_threshold)),
        on_time,
        overdue: incidents.len() - on_time,
    }
}

pub fn cluster_cards(kpis: &ClusterKpis) -> Vec<KpiCard> {
    vec![
        KpiCard {
            label: "Total Geral".into(),
            value: kpis.total,
            share: String::new(),
        },
        KpiCard {
            label: "Grandes Vultos".into(),
            value: kpis.large_scale,
            share: if kpis.large_scale > 0 { "Fora do Prazo" } else { "OK" }.into(),
        },
        KpiCard {
            label: "No Prazo".into(),
            value: kpis.on_time,
            share: percent(kpis.on_time, kpis.total),
        },
        KpiCard {
            label: "Fora Prazo".into(),
            value: kpis.overdue,
            share: percent(kpis.overdue, kpis.total),
        },
    ]
}

/// Table filters; an empty selection means "everything".
pub fn filter_view(incidents: &[Incident], regions: &[Region], statuses: &[SlaStatus]) -> Vec<Incident> {
    incidents
        .iter()
        .filter(|i| regions.is_empty() || regions.contains(&i.region))
        .filter(|i| statuses.is_empty() || statuses.contains(&i.sla))
        .cloned()
        .collect()
}

pub fn large_scale_cases(incidents: &[Incident], threshold: f64) -> Vec<&Incident> {
    incidents
        .iter()
        .filter(|i| is_large_scale(i, threshold))
        .collect()
}

pub fn incident_rows(incidents: &[Incident]) -> Vec<IncidentRow> {
    incidents
        .iter()
        .map(|i| IncidentRow {
            id: i.id.clone(),
            region: i.region.to_string(),
            at: i.at.as_deref().map(|a| a.chars().take(2).collect()).unwrap_or_default(),
            affected: format!("{:.0}", i.affected),
            sla: i.sla.to_string(),
            elapsed: i.elapsed_display.clone(),
            vip: flag_label(i.vip).to_string(),
            high_value: flag_label(i.high_value).to_string(),
            b2b: flag_label(i.b2b).to_string(),
            technicians: i.technicians,
        })
        .collect()
}

/// Contracts the hands-free summary covers: everything in the snapshot the
/// session is allowed to see.
pub fn voice_contracts(session: &Session, table: &RawTable) -> Vec<String> {
    session.visible_contracts(&present_contracts(table))
}

/// One-line spoken summary for hands-free mode.
pub fn voice_summary(incidents: &[Incident]) -> String {
    let critical = count(incidents, |i| i.sla == SlaStatus::Critical);
    format!("Resumo: {} casos. {} críticos.", incidents.len(), critical)
}

fn city_for(incident: &Incident) -> String {
    if let Some(city) = &incident.city {
        return city.to_uppercase();
    }
    let at = incident.at.as_deref().unwrap_or("N/I").trim().to_uppercase();
    let prefix: String = match at.split_once('-') {
        Some((head, _)) => head.trim().to_string(),
        None => at.chars().take(3).collect(),
    };
    AT_CITIES
        .iter()
        .find(|(code, _)| *code == prefix)
        .map(|(_, city)| city.to_string())
        .unwrap_or_else(|| "VERIFICAR CIDADE".to_string())
}

/// Text block shared on messaging groups when a large-scale case opens.
pub fn large_scale_notice(incident: &Incident, contract: &str) -> String {
    let opened = incident.opened_at.with_timezone(&operation_offset());
    let or = |v: &Option<String>, default: &str| v.clone().unwrap_or_else(|| default.to_string());
    let d = &incident.details;
    let lines = [
        "✅ *INFORMATIVO GRANDE VULTO*".to_string(),
        String::new(),
        format!("*{}*", contract.replace('_', " ")),
        String::new(),
        format!("{} - FTTx", incident.id),
        format!("ORIGEM: {}", or(&d.origin, "OLTM")),
        format!("AT: {}", or(&incident.at, "N/I")),
        format!("CIDADE: {}", city_for(incident)),
        format!("QUANT. PRIMÁRIAS AFETADAS: {}", or(&d.primaries, "N/I")),
        format!("CABO: {}", or(&d.cable, "N/I")),
        format!("AFETAÇÃO: {:.0}", incident.affected.trunc()),
        format!("BDs: {}", or(&d.bds, "N/I")),
        format!("CRIAÇÃO: {}", opened.format("%d/%m/%Y")),
        format!("HORA: {}", opened.format("%H:%M")),
        format!("PROPENSOS-ANATEL: {}", or(&d.anatel_prone, "00")),
        format!("RECLAMADOS-ANATEL: {}", or(&d.anatel_claimed, "00")),
        format!("CLIENTE VIP:  {}", flag_label(incident.vip)),
        format!("CLIENTE B2B:  {}", flag_label(incident.b2b)),
        format!("COND. ALTO VALOR: {}", flag_label(incident.high_value)),
        "DEFEITO:".to_string(),
        "PRAZO:".to_string(),
    ];
    lines.join("\n")
}
