//! Interface de terminal do genrelay: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente um job
//! a partir dos snapshots devolvidos pelo despachante.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::dispatcher::ProviderCheck;
use crate::provider::{MediaArtifact, ProviderDescriptor};
use crate::state_machine::{Attempt, JobSnapshot, JobState, ResultArtifact};

/// Indicador visual de progresso de um job no terminal.
///
/// Exibe a porcentagem, o provedor atual e as tentativas; o resultado final
/// aparece em verde (sucesso) ou vermelho (falha).
pub struct JobProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Tentativas já exibidas.
    shown_attempts: usize,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl JobProgress {
    /// Inicia a barra com a descrição do job.
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            shown_attempts: 0,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Atualiza a barra a partir de um snapshot e imprime as tentativas novas.
    pub fn update(&mut self, snapshot: &JobSnapshot) {
        for attempt in snapshot.attempts.iter().skip(self.shown_attempts) {
            self.pb.println(attempt_line(attempt, &self.yellow, &self.dim));
        }
        self.shown_attempts = snapshot.attempts.len();

        self.pb.set_position(u64::from(snapshot.progress));
        let provider = snapshot.provider.as_deref().unwrap_or("-");
        self.pb.set_message(format!("{} via {provider}", snapshot.state));
    }

    /// Finaliza a barra e exibe o resultado final do job.
    pub fn finish(mut self, snapshot: &JobSnapshot) {
        self.update(snapshot);
        self.pb.finish_and_clear();
        print_outcome(snapshot, &self.green, &self.red);
    }
}

/// Imprime as tentativas e o resultado de um job terminado.
pub fn print_snapshot(snapshot: &JobSnapshot) {
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();
    for attempt in &snapshot.attempts {
        println!("{}", attempt_line(attempt, &yellow, &dim));
    }
    print_outcome(
        snapshot,
        &Style::new().green().bold(),
        &Style::new().red().bold(),
    );
}

fn attempt_line(attempt: &Attempt, yellow: &Style, dim: &Style) -> String {
    format!(
        "  {} #{} {}: {} {}",
        yellow.apply_to("↻"),
        attempt.number,
        attempt.provider,
        attempt.classification,
        dim.apply_to(attempt.detail.as_deref().unwrap_or(""))
    )
}

fn print_outcome(snapshot: &JobSnapshot, green: &Style, red: &Style) {
    match (&snapshot.state, &snapshot.result, &snapshot.error) {
        (JobState::Succeeded, Some(result), _) => {
            println!(
                "  {} {} job succeeded via {} ({:?}, {} attempt(s), {}ms)",
                green.apply_to("✓"),
                snapshot.kind,
                result.provider,
                result.origin,
                snapshot.attempts.len(),
                snapshot.elapsed_ms
            );
            match &result.artifact {
                ResultArtifact::Text { content } => println!("\n{content}"),
                ResultArtifact::Video(media) | ResultArtifact::Audio(media) => {
                    println!("  {}", describe_media(media))
                }
            }
        }
        (_, _, Some(error)) => {
            println!("  {} Job failed: {error}", red.apply_to("✗"));
        }
        _ => println!("  Job {} is {}", snapshot.id, snapshot.state),
    }
}

fn describe_media(media: &MediaArtifact) -> String {
    let mut line = media.location.clone();
    if let Some(secs) = media.duration_secs {
        line.push_str(&format!("  {secs:.1}s"));
    }
    if let Some(bytes) = media.size_bytes {
        line.push_str(&format!("  {:.1} MB", bytes as f64 / 1_048_576.0));
    }
    if let Some(format) = &media.format {
        line.push_str(&format!("  {format}"));
    }
    line
}

/// Imprime o registro completo do job em JSON com estilo colorido.
pub fn print_audit(snapshot: &JobSnapshot) {
    let style = match snapshot.state {
        JobState::Succeeded => Style::new().green(),
        JobState::Failed => Style::new().red(),
        _ => Style::new().yellow(),
    };
    println!();
    println!("{}", style.apply_to("─── Job Record ───"));
    println!(
        "{}",
        serde_json::to_string_pretty(snapshot).unwrap_or_default()
    );
}

/// Imprime a tabela de provedores.
pub fn print_providers(providers: &[&ProviderDescriptor]) {
    if providers.is_empty() {
        println!("No providers configured. Try `genrelay demo`.");
        return;
    }
    let header = Style::new().bold();
    println!(
        "{}",
        header.apply_to(format!(
            "{:<6} {:<16} {:>8} {:>8} {:>10} {:>14}",
            "KIND", "PROVIDER", "PRIORITY", "RETRIES", "TIMEOUT", "BACKOFF"
        ))
    );
    for p in providers {
        println!(
            "{:<6} {:<16} {:>8} {:>8} {:>9}s {:>6}-{:<6}ms",
            p.kind.to_string(),
            p.id,
            p.priority,
            p.max_retries,
            p.timeout.as_secs(),
            p.backoff_base.as_millis(),
            p.backoff_cap.as_millis()
        );
    }
}

/// Resultado do teste de conexão de um provedor.
pub fn print_check(check: &ProviderCheck) {
    if check.is_ok() {
        println!(
            "  {} {} ({}) answered in {}ms",
            Style::new().green().bold().apply_to("✓"),
            check.provider,
            check.kind,
            check.latency_ms
        );
    } else {
        println!(
            "  {} {} ({}): {} {}",
            Style::new().red().bold().apply_to("✗"),
            check.provider,
            check.kind,
            check.classification,
            Style::new().dim().apply_to(check.detail.as_deref().unwrap_or(""))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_description_includes_known_fields() {
        let media = MediaArtifact {
            location: "http://host/view?filename=a.mp4".into(),
            duration_secs: Some(5.0),
            size_bytes: Some(2 * 1_048_576),
            format: Some("mp4".into()),
        };
        assert_eq!(
            describe_media(&media),
            "http://host/view?filename=a.mp4  5.0s  2.0 MB  mp4"
        );
        assert_eq!(describe_media(&MediaArtifact::at("/a.mp3")), "/a.mp3");
    }
}
