//! Configuração do copyforge carregada a partir de `copyforge.toml`.
//!
//! A struct [`ForgeConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As chaves de API nunca ficam no arquivo: cada provedor nomeia a variável
//! de ambiente de onde a sua chave é lida.

use serde::Deserialize;
use std::path::Path;

use crate::batch::DEFAULT_CHUNK_SIZE;
use crate::error::ForgeError;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "copyforge.toml";

/// Configuração de nível superior carregada de `copyforge.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgeConfig {
    /// Quantidade de jobs por chunk de batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Jobs processados em paralelo dentro de um chunk.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Diretório do armazenamento em arquivos JSON.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub qc: QcConfig,

    /// Provedores em ordem de preferência; o primeiro é o principal.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

/// Limites diários de custo e volume.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_cost_ceiling_usd")]
    pub cost_ceiling_usd: f64,

    #[serde(default = "default_job_ceiling")]
    pub job_ceiling: u64,

    /// Custo reservado na admissão de cada job, acertado depois pelo custo real.
    #[serde(default = "default_estimated_cost_usd")]
    pub estimated_cost_usd: f64,
}

/// Parâmetros do avaliador heurístico de QC.
#[derive(Debug, Clone, Deserialize)]
pub struct QcConfig {
    #[serde(default = "default_min_words")]
    pub min_words: usize,

    /// Frases que bloqueiam o artigo até aprovação humana.
    #[serde(default)]
    pub prohibited_phrases: Vec<String>,
}

/// Um provedor compatível com a Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Variável de ambiente que guarda a chave de API.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Preço por milhão de tokens de entrada, em dólares.
    #[serde(default)]
    pub input_usd_per_mtok: f64,

    /// Preço por milhão de tokens de saída, em dólares.
    #[serde(default)]
    pub output_usd_per_mtok: f64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_concurrency() -> usize {
    4
}

fn default_store_dir() -> String {
    ".copyforge".to_string()
}

fn default_cost_ceiling_usd() -> f64 {
    50.0
}

fn default_job_ceiling() -> u64 {
    1000
}

fn default_estimated_cost_usd() -> f64 {
    0.05
}

fn default_min_words() -> usize {
    300
}

fn default_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    120
}

// Principal: sonnet. Fallback: haiku, mais barato e menos sujeito a sobrecarga.
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "sonnet".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            input_usd_per_mtok: 3.0,
            output_usd_per_mtok: 15.0,
            ..ProviderConfig::default()
        },
        ProviderConfig {
            name: "haiku".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            input_usd_per_mtok: 1.0,
            output_usd_per_mtok: 5.0,
            ..ProviderConfig::default()
        },
    ]
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            cost_ceiling_usd: default_cost_ceiling_usd(),
            job_ceiling: default_job_ceiling(),
            estimated_cost_usd: default_estimated_cost_usd(),
        }
    }
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
            prohibited_phrases: Vec::new(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            input_usd_per_mtok: 0.0,
            output_usd_per_mtok: 0.0,
        }
    }
}

impl ProviderConfig {
    /// Lê a chave de API da variável de ambiente configurada.
    pub fn api_key(&self) -> Result<String, ForgeError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ForgeError::Config(format!(
                "provider {}: environment variable {} is not set",
                self.name, self.api_key_env
            ))),
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
            store_dir: default_store_dir(),
            quota: QuotaConfig::default(),
            qc: QcConfig::default(),
            providers: default_providers(),
        }
    }
}

impl ForgeConfig {
    /// Carrega a configuração de `copyforge.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, ForgeError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Carrega de um caminho explícito; aqui o arquivo ausente é erro.
    pub fn load_from(path: &Path) -> Result<Self, ForgeError> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str::<ForgeConfig>(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Aplica os overrides da CLI, que têm precedência sobre o arquivo.
    pub fn with_overrides(
        mut self,
        chunk_size: Option<usize>,
        concurrency: Option<usize>,
    ) -> Result<Self, ForgeError> {
        if let Some(size) = chunk_size {
            self.chunk_size = size;
        }
        if let Some(n) = concurrency {
            self.concurrency = n;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.chunk_size == 0 {
            return Err(ForgeError::Config("chunk_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ForgeError::Config("concurrency must be at least 1".into()));
        }
        if self.providers.is_empty() {
            return Err(ForgeError::Config(
                "at least one provider must be configured".into(),
            ));
        }
        if self.quota.cost_ceiling_usd < 0.0 || self.quota.estimated_cost_usd < 0.0 {
            return Err(ForgeError::Config("quota amounts cannot be negative".into()));
        }
        if let Some(p) = self.providers.iter().find(|p| p.model.trim().is_empty()) {
            return Err(ForgeError::Config(format!("provider {} has no model", p.name)));
        }
        Ok(())
    }
}
