use crate::source::relabel;
use crate::types::RawTable;
use crate::util::strip_float_suffix;
use calamine::{open_workbook_auto, Data, DataType, Reader};
use csv::ReaderBuilder;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid delimited file {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("invalid spreadsheet {path}: {source}")]
    Sheet {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("spreadsheet {0} has no worksheet")]
    EmptyWorkbook(PathBuf),
    #[error("{path} has no column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub parse_errors: usize,
}

/// CNL code → municipality, immutable for one cache window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CnlTable {
    by_code: HashMap<String, String>,
}

impl CnlTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut by_code = HashMap::new();
        for (code, city) in pairs {
            let code = strip_float_suffix(code.as_ref()).to_string();
            if code.is_empty() {
                continue;
            }
            by_code
                .entry(code)
                .or_insert_with(|| city.as_ref().trim().to_uppercase());
        }
        Self { by_code }
    }

    pub fn municipality(&self, code: &str) -> Option<&str> {
        self.by_code.get(strip_float_suffix(code)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Header row plus cells, `None` for empty cells.
struct Grid {
    headers: Vec<String>,
    records: Vec<Vec<Option<String>>>,
    report: LoadReport,
}

/// Pick the delimiter that splits the header line into the most fields.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|d| header_line.bytes().filter(|b| b == d).count())
        .unwrap_or(b',')
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn non_empty(cell: &str) -> Option<String> {
    let cell = cell.trim();
    (!cell.is_empty()).then(|| cell.to_string())
}

fn read_grid(path: &Path) -> Result<Grid, LoadError> {
    if is_spreadsheet(path) {
        read_sheet(path)
    } else {
        read_delimited(path)
    }
}

fn read_delimited(path: &Path) -> Result<Grid, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = raw.trim_start_matches('\u{feff}');
    let first_line = text.lines().next().unwrap_or_default();
    let mut rdr = ReaderBuilder::new()
        .delimiter(sniff_delimiter(first_line))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut report = LoadReport::default();
    let mut records = Vec::new();
    for result in rdr.records() {
        report.total_rows += 1;
        match result {
            Ok(record) => records.push(record.iter().map(non_empty).collect()),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable row");
                report.parse_errors += 1;
            }
        }
    }
    Ok(Grid {
        headers,
        records,
        report,
    })
}

fn sheet_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => non_empty(s),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        other => non_empty(&other.to_string()),
    }
}

/// First worksheet of a workbook; its first row is the header.
fn read_sheet(path: &Path) -> Result<Grid, LoadError> {
    let sheet_err = |source: calamine::Error| LoadError::Sheet {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(sheet_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::EmptyWorkbook(path.to_path_buf()))?
        .map_err(sheet_err)?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|first| first.iter().map(|c| sheet_cell(c).unwrap_or_default()).collect())
        .unwrap_or_default();
    let records: Vec<Vec<Option<String>>> = rows
        .map(|row| row.iter().map(sheet_cell).collect())
        .collect();
    let report = LoadReport {
        total_rows: records.len(),
        parse_errors: 0,
    };
    Ok(Grid {
        headers,
        records,
        report,
    })
}

/// Load an uploaded export (delimited text or spreadsheet) in place of the
/// network fetch.
pub fn load_upload(path: &Path) -> Result<(RawTable, LoadReport), LoadError> {
    let Grid {
        headers,
        records,
        report,
    } = read_grid(path)?;

    let rows = records
        .into_iter()
        .map(|record| {
            let mut row = Map::new();
            for (header, cell) in headers.iter().zip(record) {
                if header.is_empty() {
                    continue;
                }
                row.insert(header.clone(), cell.map(Value::String).unwrap_or(Value::Null));
            }
            row
        })
        .collect();

    let mut table = RawTable { headers, rows };
    relabel(&mut table);
    tracing::info!(
        path = %path.display(),
        rows = table.len(),
        skipped = report.parse_errors,
        "upload loaded"
    );
    Ok((table, report))
}

/// The configured reference file, or its `.xlsx` sibling when only the
/// spreadsheet is present.
fn reference_file(path: &Path) -> PathBuf {
    if path.exists() || is_spreadsheet(path) {
        return path.to_path_buf();
    }
    let sheet = path.with_extension("xlsx");
    if sheet.exists() {
        tracing::debug!(path = %sheet.display(), "using spreadsheet CNL reference");
        sheet
    } else {
        path.to_path_buf()
    }
}

/// Load the CNL reference file. Needs `CNL` and `MUNICÍPIO` columns.
pub fn load_cnl(path: &Path) -> Result<CnlTable, LoadError> {
    let path = reference_file(path);
    let grid = read_grid(&path)?;
    let find = |names: &[&str], column: &'static str| {
        grid.headers
            .iter()
            .position(|h| names.contains(&h.trim().to_uppercase().as_str()))
            .ok_or_else(|| LoadError::MissingColumn {
                path: path.clone(),
                column,
            })
    };
    let code_idx = find(&["CNL"], "CNL")?;
    let city_idx = find(&["MUNICÍPIO", "MUNICIPIO"], "MUNICÍPIO")?;

    let pairs = grid.records.iter().filter_map(|rec| {
        let code = rec.get(code_idx).cloned().flatten()?;
        let city = rec.get(city_idx).cloned().flatten().unwrap_or_default();
        Some((code, city))
    });
    let table = CnlTable::from_pairs(pairs);
    tracing::info!(path = %path.display(), codes = table.len(), "CNL reference loaded");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::io::Write;

    fn write_tmp(name: &str, body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn delimiter_sniffing() {
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a\tb"), b'\t');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn cnl_table_strips_codes_and_keeps_first_duplicate() {
        let (_dir, path) = write_tmp(
            "cnl.csv",
            "CNL;MUNICÍPIO\n12345.0; são josé dos campos \n12345;OUTRA\n;SEM CODIGO\n678;Taubaté\n",
        );
        let table = load_cnl(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.municipality("12345"), Some("SÃO JOSÉ DOS CAMPOS"));
        assert_eq!(table.municipality("678.0"), Some("TAUBATÉ"));
        assert_eq!(table.municipality("999"), None);
    }

    #[test]
    fn cnl_without_required_column_is_rejected() {
        let (_dir, path) = write_tmp("cnl.csv", "CODIGO,CIDADE\n1,X\n");
        let err = load_cnl(&path).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { column: "CNL", .. }));
    }

    #[test]
    fn upload_relabels_source_columns() {
        let (_dir, path) = write_tmp(
            "base.csv",
            "ocorrencia;contrato;data_abertura;afetacao\nOC1;ability_sj;2024-05-01 10:00:00;150\nOC2;TEL_JI;;\n",
        );
        let (table, report) = load_upload(&path).unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(table.len(), 2);
        assert!(table.headers.iter().any(|h| h == "Ocorrência"));
        assert_eq!(table.rows[0].get("Afetação"), Some(&Value::String("150".into())));
        assert_eq!(table.rows[1].get("Data Abertura"), Some(&Value::Null));
    }

    #[test]
    fn spreadsheet_upload_reads_first_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base_atualizada.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, header) in ["ocorrencia", "contrato", "data_abertura", "afetacao"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        sheet.write_string(1, 0, "OC1").unwrap();
        sheet.write_string(1, 1, "ABILITY_SJ").unwrap();
        sheet.write_string(1, 2, "01/05/2024 10:00").unwrap();
        sheet.write_number(1, 3, 150).unwrap();
        sheet.write_string(2, 0, "OC2").unwrap();
        sheet.write_string(2, 1, "TEL_JI").unwrap();
        sheet.write_number(2, 3, 99.5).unwrap();
        workbook.save(&path).unwrap();

        let (table, report) = load_upload(&path).unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(table.rows[0].get("Contrato"), Some(&Value::String("ABILITY_SJ".into())));
        assert_eq!(table.rows[0].get("Afetação"), Some(&Value::String("150".into())));
        assert_eq!(table.rows[1].get("Afetação"), Some(&Value::String("99.5".into())));
        assert_eq!(table.rows[1].get("Data Abertura"), Some(&Value::Null));
    }

    #[test]
    fn cnl_falls_back_to_spreadsheet_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "CNL").unwrap();
        sheet.write_string(0, 1, "MUNICÍPIO").unwrap();
        sheet.write_number(1, 0, 3549904).unwrap();
        sheet.write_string(1, 1, "São José dos Campos").unwrap();
        workbook
            .save(dir.path().join("CNL_BASE_MONITORAMENTO.xlsx"))
            .unwrap();

        let table = load_cnl(&dir.path().join("CNL_BASE_MONITORAMENTO.csv")).unwrap();
        assert_eq!(table.municipality("3549904"), Some("SÃO JOSÉ DOS CAMPOS"));
    }

    #[test]
    fn unreadable_spreadsheet_is_a_sheet_error() {
        let (_dir, path) = write_tmp("base.xlsx", "not a workbook");
        assert!(matches!(load_upload(&path), Err(LoadError::Sheet { .. })));
    }
}
