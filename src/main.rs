// Entry point and interactive console flow.
//
// - Login first (skipped when the secrets file lists no passwords).
// - Option [1] shows the operational view of one contract: KPI cards,
//   large-scale alerts, the incident table and optional exports.
// - Option [2] shows the cluster view across contracts (admins only).
// - Option [3] drops cached data so the next view refetches.
use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use once_cell::sync::Lazy;
use sigma_ops::auth::{Authenticator, Credentials, SecretsAuthenticator, Session};
use sigma_ops::config::{self, AppConfig};
use sigma_ops::hub::{DataHub, DataOrigin, HubError};
use sigma_ops::output;
use sigma_ops::reports;
use sigma_ops::rules::{operation_offset, ContractFilter};
use sigma_ops::source::ApiSource;
use sigma_ops::types::{Incident, Region, SlaStatus};
use sigma_ops::util;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sigma_ops", about = "SigmaOPS: monitoramento de ocorrências")]
struct Cli {
    /// Secrets file with API credentials, users and dashboard settings.
    #[arg(long, env = "SIGMAOPS_SECRETS", default_value = config::DEFAULT_SECRETS_PATH)]
    secrets: PathBuf,
    /// Read ocorrências from a CSV or spreadsheet export instead of the API.
    #[arg(long)]
    upload: Option<PathBuf>,
    /// Print the one-line summary and exit.
    #[arg(long)]
    voice: bool,
    /// Directory for exported reports.
    #[arg(long)]
    out: Option<PathBuf>,
}

// Session state kept for the whole run so cached snapshots are shared by
// every view.
static APP_STATE: Lazy<Mutex<Option<AppState>>> = Lazy::new(|| Mutex::new(None));

struct AppState {
    hub: DataHub,
    session: Session,
}

/// `None` once stdin is closed.
fn prompt(label: &str) -> Option<String> {
    print!("{}", label);
    let _ = io::stdout().flush();
    util::read_line_from(&mut io::stdin().lock())
}

fn read_choice() -> Option<String> {
    prompt("Enter choice: ")
}

fn confirm(label: &str) -> bool {
    loop {
        let Some(answer) = prompt(&format!("{} (S/N): ", label)) else {
            return false;
        };
        match answer.to_uppercase().as_str() {
            "S" | "Y" => return true,
            "N" | "" => return false,
            _ => println!("Opção inválida. Digite S ou N."),
        }
    }
}

/// Ask for one entry of `options` by number.
fn pick_one(options: &[String]) -> Option<String> {
    for (i, opt) in options.iter().enumerate() {
        println!("[{}] {}", i + 1, opt);
    }
    read_choice()?
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
}

/// Comma-separated labels parsed with `parse`; unknown labels are ignored.
fn read_filter<T>(label: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    prompt(label)
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| parse(s))
        .collect()
}

fn login(auth: &SecretsAuthenticator) -> Option<Session> {
    if !auth.requires_login() {
        tracing::info!("no users configured, opening session as admin");
        return Some(Session::admin("admin"));
    }
    for _ in 0..3 {
        let credentials = Credentials {
            username: prompt("Usuário: ")?,
            password: prompt("Senha: ")?,
        };
        if let Some(session) = auth.authenticate(&credentials) {
            return Some(session);
        }
        println!("😕 Usuário ou senha incorretos.\n");
    }
    None
}

fn report_failure(err: &HubError) {
    println!("Falha ao carregar dados: {}", err);
    if err.is_retryable() {
        println!("Use [3] para tentar novamente.");
    }
    println!();
}

/// Handle option [1]: operational view of a single contract.
fn handle_operational(state: &mut AppState) {
    let snapshot = match state.hub.snapshot() {
        Ok(s) => s,
        Err(e) => return report_failure(&e),
    };
    let config = state.hub.config().clone();
    let options = state
        .session
        .visible_contracts(&reports::available_contracts(&snapshot, &config.main_contracts));
    if options.is_empty() {
        println!("Nenhum contrato encontrado.\n");
        return;
    }

    println!("Selecione o contrato:");
    let Some(contract) = pick_one(&options) else {
        println!("Opção inválida.\n");
        return;
    };

    let incidents = match state.hub.classify(&ContractFilter::Only(contract.clone()), Utc::now()) {
        Ok(list) => list,
        Err(e) => return report_failure(&e),
    };
    if incidents.is_empty() {
        println!("Sem dados.\n");
        return;
    }

    let monitored = contract == config.monitored_contract;
    let regions = if monitored {
        read_filter("Região (Litoral,Vale; enter = todas): ", Region::from_label)
    } else {
        Vec::new()
    };
    let labels = SlaStatus::ALL.map(|s| s.label()).join(",");
    let statuses = read_filter(&format!("SLA ({}; enter = todos): ", labels), SlaStatus::from_label);

    let kpis = reports::operational_kpis(&incidents);
    let cards = reports::kpi_cards(&kpis, monitored);
    output::preview_table(&format!("SigmaOPS • {}", contract), &cards, None);

    let large = reports::large_scale_cases(&incidents, config.large_scale_threshold);
    if !large.is_empty() {
        println!("🚨 {} GRANDE(S) VULTO(S) EM ABERTO\n", large.len());
        if confirm("Ver detalhes GV?") {
            for inc in &large {
                println!("{}\n", reports::large_scale_notice(inc, &contract));
            }
        }
    }

    let view = reports::filter_view(&incidents, &regions, &statuses);
    output::preview_table(
        &format!("Ocorrências ({} de {})", util::format_int(view.len()), util::format_int(incidents.len())),
        &reports::incident_rows(&view),
        None,
    );

    if confirm("Exportar relatórios?") {
        let now = Utc::now().with_timezone(&operation_offset());
        let rows = reports::incident_rows(&incidents);
        match output::export_operational(&config.output_dir, &contract, now, &cards, &rows) {
            Ok(files) => {
                for f in files {
                    println!("  {}", f.display());
                }
                println!();
            }
            Err(e) => eprintln!("Erro na exportação: {}\n", e),
        }
    }
}

/// Handle option [2]: consolidated view across contracts.
fn handle_cluster(state: &mut AppState) {
    if !state.session.is_admin() {
        println!("Visão cluster disponível apenas para administradores.\n");
        return;
    }
    let snapshot = match state.hub.snapshot() {
        Ok(s) => s,
        Err(e) => return report_failure(&e),
    };
    let config = state.hub.config().clone();
    let options = reports::available_contracts(&snapshot, &config.main_contracts);
    if options.is_empty() {
        println!("Nenhum contrato encontrado.\n");
        return;
    }

    println!("Contratos disponíveis: {}", options.join(", "));
    let chosen: Vec<String> = read_filter("Contratos (enter = todos): ", |s| {
        let c = s.trim().to_uppercase();
        options.contains(&c).then_some(c)
    });
    let chosen = if chosen.is_empty() { options } else { chosen };

    let incidents = match state.hub.classify(&ContractFilter::AnyOf(chosen.clone()), Utc::now()) {
        Ok(list) => list,
        Err(e) => return report_failure(&e),
    };
    if incidents.is_empty() {
        println!("Sem dados.\n");
        return;
    }

    let kpis = reports::cluster_kpis(&incidents, config.large_scale_threshold);
    let cards = reports::cluster_cards(&kpis);
    let summary = reports::contract_summary(&incidents, Some(chosen.as_slice()), config.large_scale_threshold);
    output::preview_table("Visão Cluster", &cards, None);
    output::preview_table("Detalhamento", &summary, None);

    if confirm("Exportar dashboard?") {
        let now = Utc::now().with_timezone(&operation_offset());
        match output::export_cluster(&config.output_dir, now, &cards, &summary) {
            Ok(files) => {
                for f in files {
                    println!("  {}", f.display());
                }
                println!();
            }
            Err(e) => eprintln!("Erro na exportação: {}\n", e),
        }
    }
}

fn voice_incidents(hub: &mut DataHub, session: &Session) -> Result<Vec<Incident>, HubError> {
    let snapshot = hub.snapshot()?;
    let visible = ContractFilter::AnyOf(reports::voice_contracts(session, &snapshot));
    hub.classify(&visible, Utc::now())
}

/// Print the one-line summary; load failures degrade to an empty summary.
fn voice(hub: &mut DataHub, session: &Session) {
    let incidents = voice_incidents(hub, session).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "voice summary without data");
        eprintln!("Falha ao carregar dados: {}", e);
        Vec::new()
    });
    println!("{}", reports::voice_summary(&incidents));
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&cli.secrets)
        .with_context(|| format!("loading {}", cli.secrets.display()))?;
    if let Some(out) = cli.out {
        config.output_dir = out;
    }

    let origin = match cli.upload {
        Some(path) => DataOrigin::Upload(path),
        None => DataOrigin::Api(ApiSource::from_config(&config)),
    };
    let auth = SecretsAuthenticator::from_config(&config);
    let mut hub = DataHub::new(config, origin);

    let Some(session) = login(&auth) else {
        anyhow::bail!("login falhou");
    };
    if cli.voice {
        voice(&mut hub, &session);
        return Ok(());
    }
    println!("Bem-vindo, {}.\n", session.user);

    let mut guard = APP_STATE.lock().unwrap_or_else(|e| e.into_inner());
    let state = guard.insert(AppState { hub, session });

    loop {
        println!("SigmaOPS • {}", Utc::now().with_timezone(&operation_offset()).format("%H:%M"));
        println!("[1] Operacional");
        if state.session.is_admin() {
            println!("[2] Cluster");
        }
        println!("[3] Atualizar dados");
        println!("[0] Sair\n");
        match read_choice().as_deref() {
            Some("1") => handle_operational(state),
            Some("2") => handle_cluster(state),
            Some("3") => {
                state.hub.refresh();
                println!("Dados serão recarregados.\n");
            }
            Some("0") | None => {
                println!("Saindo.");
                break;
            }
            _ => println!("Opção inválida.\n"),
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!(error = %e, "sigma_ops stopped");
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
