use crate::types::{ContractSummary, IncidentRow, KpiCard};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use thiserror::Error;

pub const ITEMS_PER_PAGE: usize = 20;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> OutputError + '_ {
    move |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), OutputError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(io_err(path))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s).map_err(io_err(path))?;
    Ok(())
}

fn write_text(path: &Path, body: &str) -> Result<(), OutputError> {
    fs::write(path, body).map_err(io_err(path))
}

pub fn render_table<T>(rows: &[T], max_rows: Option<usize>) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows
        .iter()
        .cloned()
        .take(max_rows.unwrap_or(usize::MAX))
        .collect();
    if slice.is_empty() {
        return "(sem dados)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table<T>(title: &str, rows: &[T], max_rows: Option<usize>)
where
    T: Tabled + Clone,
{
    println!("\n{}\n", title);
    println!("{}\n", render_table(rows, max_rows));
    if let Some(max) = max_rows {
        if rows.len() > max {
            println!("(+{} linhas)\n", rows.len() - max);
        }
    }
}

pub fn render_cards(contract: &str, now: DateTime<FixedOffset>, cards: &[KpiCard]) -> String {
    format!(
        "# SIGMA OPS\n\n{} • {}\n\n{}\n",
        contract,
        now.format("%H:%M"),
        render_table(cards, None)
    )
}

/// Split the incident list into export pages of [`ITEMS_PER_PAGE`] rows.
pub fn render_list_pages(contract: &str, now: DateTime<FixedOffset>, rows: &[IncidentRow]) -> Vec<String> {
    let pages: Vec<&[IncidentRow]> = rows.chunks(ITEMS_PER_PAGE).collect();
    let total = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut title = format!("# SIGMA OPS: {}\n\n{}", contract, now.format("%d/%m • %H:%M"));
            if total > 1 {
                title.push_str(&format!("\n\n(Parte {}/{})", i + 1, total));
            }
            format!("{}\n\n{}\n", title, render_table(chunk, None))
        })
        .collect()
}

pub fn render_cluster(now: DateTime<FixedOffset>, cards: &[KpiCard], summary: &[ContractSummary]) -> String {
    format!(
        "# VISÃO CLUSTER\n\nConsolidado SigmaOPS • {}\n\n{}\n\n## DETALHAMENTO POR CONTRATO\n\n{}\n\nGerado via SigmaOPS\n",
        now.format("%d/%m %H:%M"),
        render_table(cards, None),
        render_table(summary, None)
    )
}

/// Write the operational exports (cards, paged list, CSV) for one contract.
pub fn export_operational(
    dir: &Path,
    contract: &str,
    now: DateTime<FixedOffset>,
    cards: &[KpiCard],
    rows: &[IncidentRow],
) -> Result<Vec<PathBuf>, OutputError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let stamp = now.format("%H%M").to_string();
    let mut written = Vec::new();

    let cards_path = dir.join(format!("Resumo_{}.md", stamp));
    write_text(&cards_path, &render_cards(contract, now, cards))?;
    written.push(cards_path);

    let pages = render_list_pages(contract, now, rows);
    let single = pages.len() == 1;
    for (i, page) in pages.iter().enumerate() {
        let name = if single {
            format!("Lista_{}.md", stamp)
        } else {
            format!("Lista_{}_P{}.md", stamp, i + 1)
        };
        let path = dir.join(name);
        write_text(&path, page)?;
        written.push(path);
    }

    let csv_path = dir.join(format!("Lista_{}.csv", stamp));
    write_csv(&csv_path, rows)?;
    written.push(csv_path);

    tracing::info!(contract, files = written.len(), dir = %dir.display(), "operational export written");
    Ok(written)
}

/// Write the cluster dashboard and its JSON summary.
pub fn export_cluster(
    dir: &Path,
    now: DateTime<FixedOffset>,
    cards: &[KpiCard],
    summary: &[ContractSummary],
) -> Result<Vec<PathBuf>, OutputError> {
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let stamp = now.format("%H%M").to_string();

    let dash_path = dir.join(format!("Dash_{}.md", stamp));
    write_text(&dash_path, &render_cluster(now, cards, summary))?;
    let json_path = dir.join(format!("Dash_{}.json", stamp));
    write_json(&json_path, &summary)?;

    tracing::info!(contracts = summary.len(), dir = %dir.display(), "cluster export written");
    Ok(vec![dash_path, json_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 2, 9, 7, 0)
            .unwrap()
    }

    fn row(id: usize) -> IncidentRow {
        IncidentRow {
            id: format!("OC{id}"),
            region: "Geral".into(),
            at: "TG".into(),
            affected: "0".into(),
            sla: "No Prazo".into(),
            elapsed: "01:00:00".into(),
            vip: "NÃO".into(),
            high_value: "NÃO".into(),
            b2b: "NÃO".into(),
            technicians: 1,
        }
    }

    #[test]
    fn list_is_paged_by_twenty() {
        let rows: Vec<IncidentRow> = (0..45).map(row).collect();
        let pages = render_list_pages("TEL_JI", now(), &rows);
        assert_eq!(pages.len(), 3);
        assert!(pages[0].contains("(Parte 1/3)"));
        assert!(pages[2].contains("OC44"));
        assert!(!pages[2].contains("OC39"));

        let single = render_list_pages("TEL_JI", now(), &rows[..3]);
        assert_eq!(single.len(), 1);
        assert!(!single[0].contains("Parte"));
        assert!(render_list_pages("TEL_JI", now(), &[]).is_empty());
    }

    #[test]
    fn empty_tables_render_placeholder() {
        let rows: Vec<IncidentRow> = Vec::new();
        assert_eq!(render_table(&rows, None), "(sem dados)");
    }

    #[test]
    fn operational_export_writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<IncidentRow> = (0..21).map(row).collect();
        let cards = vec![KpiCard {
            label: "Total".into(),
            value: 21,
            share: String::new(),
        }];
        let files = export_operational(dir.path(), "TEL_JI", now(), &cards, &rows).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["Resumo_0907.md", "Lista_0907_P1.md", "Lista_0907_P2.md", "Lista_0907.csv"]
        );
        let csv = fs::read_to_string(dir.path().join("Lista_0907.csv")).unwrap();
        assert!(csv.starts_with("Ocorrência,Area,AT"));
        assert_eq!(csv.lines().count(), 22);
    }

    #[test]
    fn cluster_export_writes_dashboard_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let summary = vec![ContractSummary {
            contract: "TEL_JI".into(),
            total: 2,
            on_time: 1,
            overdue: 1,
            large_scale: 0,
            vip: 0,
            high_value: 0,
            b2b: 0,
            critical: 0,
        }];
        let files = export_cluster(dir.path(), now(), &[], &summary).unwrap();
        assert_eq!(files.len(), 2);
        let dash = fs::read_to_string(&files[0]).unwrap();
        assert!(dash.contains("VISÃO CLUSTER"));
        assert!(dash.contains("TEL_JI"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&files[1]).unwrap()).unwrap();
        assert_eq!(json[0]["Total"], 2);
    }
}
