//! Interface de terminal do slidecast: spinner e saída colorida para `watch`.
//!
//! Usa `indicatif` para o spinner e `console` para as cores. O
//! [`WatchProgress`] acompanha um job remoto consultando a API de status.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::{JobId, JobStatusView, PublicState};

/// Indicador visual do estado de um job no terminal.
///
/// Spinner enquanto o job está `EN_PROCESO`; verde para `COMPLETADO`,
/// vermelho para `ERROR`.
pub struct WatchProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WatchProgress {
    pub fn start(job_id: JobId) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("job {job_id}: aguardando"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn update(&self, view: &JobStatusView) {
        self.pb.set_message(format!(
            "job {} ({}): {}",
            view.id,
            view.title,
            self.yellow.apply_to(view.state)
        ));
    }

    /// Mensagem transitória, por exemplo uma consulta que falhou.
    pub fn note(&self, message: &str) {
        self.pb
            .println(format!("  {} {message}", self.yellow.apply_to("↻")));
    }

    /// Finaliza o spinner e exibe o resultado final do job.
    pub fn complete(&self, view: &JobStatusView) {
        self.pb.finish_and_clear();
        match view.state {
            PublicState::Completado => {
                println!(
                    "  {} {} pronto: {} ({:.1}s)",
                    self.green.apply_to("✓"),
                    view.title,
                    view.output_path.as_deref().unwrap_or("-"),
                    view.duration_seconds.unwrap_or_default()
                );
            }
            PublicState::Error => {
                println!("  {} {} falhou", self.red.apply_to("✗"), view.title);
            }
            PublicState::EnProceso => {}
        }
    }
}

/// Consulta `GET {server}/api/videos/{id}` uma vez; `None` quando o job não existe.
pub async fn fetch_status(
    http: &reqwest::Client,
    server: &str,
    job_id: JobId,
) -> Result<Option<JobStatusView>> {
    let url = format!("{}/api/videos/{job_id}", server.trim_end_matches('/'));
    let response = http
        .get(&url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("status request failed with {status}: {body}");
    }
    let view = response
        .json::<JobStatusView>()
        .await
        .context("decoding job status")?;
    Ok(Some(view))
}

/// Consulta o status até o job chegar a um estado terminal.
///
/// Erros de rede são mostrados e a consulta continua; um job inexistente encerra.
pub async fn watch(server: &str, job_id: JobId, interval: Duration) -> Result<JobStatusView> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let progress = WatchProgress::start(job_id);

    loop {
        match fetch_status(&http, server, job_id).await {
            Ok(Some(view)) if view.state.is_terminal() => {
                progress.complete(&view);
                return Ok(view);
            }
            Ok(Some(view)) => progress.update(&view),
            Ok(None) => {
                progress.pb.finish_and_clear();
                bail!("job {job_id} not found");
            }
            Err(e) => progress.note(&format!("{e:#}")),
        }
        tokio::time::sleep(interval).await;
    }
}
