//! Interface de linha de comando do copyforge baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (submit, run, resume,
//! status, job, quota) e flags globais (--config, --chunk-size,
//! --concurrency, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// copyforge: geração de artigos com QC, resgate único e batches retomáveis.
#[derive(Debug, Parser)]
#[command(name = "copyforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./copyforge.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Jobs por chunk; sobrepõe o arquivo de configuração.
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Jobs em paralelo dentro de um chunk.
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria um batch a partir de um arquivo JSON com uma lista de jobs.
    Submit {
        /// Arquivo JSON: array de objetos {publisherDomain, targetUrl, anchorText}.
        file: PathBuf,

        /// Processa o batch logo após criá-lo.
        #[arg(long, default_value_t = false)]
        run: bool,
    },

    /// Processa um batch a partir do último checkpoint.
    Run {
        batch_id: String,
    },

    /// Retoma um batch interrompido, pausado pela cota ou falho.
    Resume {
        batch_id: String,
    },

    /// Mostra status, checkpoint e contagens de um batch.
    Status {
        batch_id: String,
    },

    /// Processa um único job descrito em um arquivo JSON, ou retoma um job
    /// já gravado (ex.: adiado pela cota) com `--id`.
    Job {
        #[arg(required_unless_present = "id")]
        file: Option<PathBuf>,

        #[arg(long, conflicts_with = "file")]
        id: Option<String>,
    },

    /// Inspeciona ou zera a cota do período.
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum QuotaAction {
    Show,
    Reset,
}
