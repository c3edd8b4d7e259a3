//! Interface de terminal do copyforge: barras de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para progresso e `console` para estilização
//! com cores. O [`BatchProgress`] recebe os eventos de conclusão dos jobs
//! como um [`EventSink`] e avança a barra a cada job terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::batch::{Batch, BatchRunOutcome, BatchRunReport, BatchStats};
use crate::config::QuotaConfig;
use crate::events::{CompletionEvent, EventSink};
use crate::quota::QuotaUsage;
use crate::state_machine::{Job, JobInput, JobStatus};

struct Palette {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Palette {
    fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    fn for_status(&self, status: JobStatus) -> &Style {
        match status {
            JobStatus::Delivered => &self.green,
            JobStatus::Aborted => &self.red,
            _ => &self.yellow,
        }
    }
}

/// Barra de progresso de um batch, alimentada pelos eventos de conclusão.
pub struct BatchProgress {
    pb: ProgressBar,
    palette: Palette,
}

impl BatchProgress {
    /// A barra começa na contagem de jobs já terminais do batch.
    pub fn start(batch: &Batch) -> Self {
        let pb = ProgressBar::with_draw_target(
            Some(batch.job_ids.len() as u64),
            ProgressDrawTarget::stdout(),
        );
        // O template é constante; se falhar, fica o estilo padrão.
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_position(batch.stats.terminal() as u64);
        pb.set_message(format!("batch {}", batch.id));
        pb.enable_steady_tick(Duration::from_millis(120));

        Self {
            pb,
            palette: Palette::new(),
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl EventSink for BatchProgress {
    fn emit(&self, event: CompletionEvent) {
        self.pb.inc(1);
        // Só os jobs que precisam de atenção ganham linha própria.
        if event.status != JobStatus::Delivered {
            let style = self.palette.for_status(event.status);
            self.pb.println(format!(
                "  {} {} {}",
                style.apply_to("✗"),
                event.job_id,
                style.apply_to(event.status),
            ));
        }
    }
}

/// Spinner para o processamento de um único job.
pub struct JobSpinner {
    pb: ProgressBar,
    palette: Palette,
}

impl JobSpinner {
    pub fn start(input: &JobInput) -> Self {
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!(
            "writing for {} -> {}",
            input.publisher_domain, input.target_url
        ));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            palette: Palette::new(),
        }
    }

    /// Finaliza o spinner e mostra o estado final do job.
    pub fn complete(&self, job: &Job) {
        self.pb.finish_and_clear();
        let style = self.palette.for_status(job.status);
        let mark = if job.status == JobStatus::Delivered { "✓" } else { "✗" };
        println!(
            "  {} Job {} {}",
            style.apply_to(mark),
            job.id,
            style.apply_to(job.status)
        );
        if let Some(resolution) = &job.resolution {
            println!("    {}", self.palette.dim.apply_to(resolution));
        }
        if let Some(report) = &job.qc_report {
            println!(
                "    qc {} score {} ({} issues)",
                report.status,
                report.overall_score,
                report.issues.len()
            );
        }
        println!(
            "    attempts {} rescues {} cost ${:.4}",
            job.attempt_count, job.rescue_count, job.cost_usd
        );
    }

    /// Job adiado pela cota: nada foi gerado.
    pub fn deferred(&self, reason: impl std::fmt::Display) {
        self.pb.finish_and_clear();
        println!(
            "  {} Job deferred: {reason}",
            self.palette.yellow.apply_to("↻")
        );
    }
}

pub fn print_report(report: &BatchRunReport) {
    let palette = Palette::new();
    let headline = match report.outcome {
        BatchRunOutcome::Completed => palette.green.apply_to("Batch completed".to_string()),
        BatchRunOutcome::Deferred => {
            palette.yellow.apply_to("Batch paused: quota exhausted".to_string())
        }
        BatchRunOutcome::Cancelled => palette.yellow.apply_to("Batch cancelled".to_string()),
        BatchRunOutcome::NotRunnable(status) => {
            palette.dim.apply_to(format!("Batch is {status}; nothing to run"))
        }
    };
    println!("{headline}");
    println!(
        "  batch {}  chunks run {}  checkpoint {}",
        report.batch_id, report.chunks_processed, report.checkpoint
    );
    print_stats(&palette, &report.stats);
}

pub fn print_batch(batch: &Batch) {
    let palette = Palette::new();
    println!("{}", palette.dim.apply_to("─── Batch ───"));
    println!("  id          {}", batch.id);
    println!("  status      {}", batch.status);
    println!(
        "  checkpoint  {}/{} chunks of {}",
        batch.checkpoint,
        batch.chunk_count(),
        batch.chunk_size
    );
    println!("  updated     {}", batch.updated_at.to_rfc3339());
    print_stats(&palette, &batch.stats);
}

pub fn print_quota(usage: &QuotaUsage, config: &QuotaConfig) {
    let palette = Palette::new();
    let near_limit = usage.spent_usd >= config.cost_ceiling_usd * 0.9
        || usage.jobs as f64 >= config.job_ceiling as f64 * 0.9;
    let style = if near_limit { &palette.yellow } else { &palette.green };
    println!("{}", palette.dim.apply_to(format!("─── Quota {} ───", usage.period)));
    println!(
        "  spent  {}",
        style.apply_to(format!(
            "${:.2} / ${:.2}",
            usage.spent_usd, config.cost_ceiling_usd
        ))
    );
    println!(
        "  jobs   {}",
        style.apply_to(format!("{} / {}", usage.jobs, config.job_ceiling))
    );
}

fn print_stats(palette: &Palette, stats: &BatchStats) {
    println!(
        "  {} delivered  {} blocked  {} aborted  {} pending",
        palette.green.apply_to(stats.delivered),
        palette.yellow.apply_to(stats.blocked),
        palette.red.apply_to(stats.aborted),
        stats.pending + stats.running,
    );
}
