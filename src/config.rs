//! Configuração do genrelay carregada a partir de `genrelay.toml`.
//!
//! A struct [`GenrelayConfig`] contém os tempos de espera do despachante e a
//! lista ordenada de provedores (`[[providers]]`). Valores ausentes no
//! arquivo usam defaults sensíveis. A variável de ambiente `GENRELAY_CONFIG`
//! substitui o caminho padrão do arquivo.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::dispatcher::DispatchSettings;
use crate::error::{GenrelayError, Result};
use crate::orchestrator::TrackingSettings;
use crate::provider::{ProviderDescriptor, SimStep};
use crate::request::GenerationKind;

/// Caminho padrão do arquivo de configuração.
pub const DEFAULT_CONFIG_PATH: &str = "genrelay.toml";

/// Variável de ambiente que aponta para outro arquivo de configuração.
pub const CONFIG_ENV: &str = "GENRELAY_CONFIG";

/// Protocolo falado por um provedor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// API de chat compatível com OpenAI (OpenAI, Zhipu, Moonshot, Doubao).
    Chat,
    /// Dialeto DashScope do Qwen.
    Qwen,
    /// Servidor ComfyUI com workflow de texto para vídeo.
    Comfyui,
    /// API genérica de tarefas assíncronas (TTS, vídeo hospedado).
    Task,
    /// Provedor roteirizado, sem rede.
    Simulated,
}

impl Protocol {
    /// Protocolos de rede exigem `endpoint`.
    pub fn needs_endpoint(&self) -> bool {
        !matches!(self, Protocol::Simulated)
    }
}

/// Um provedor declarado em `[[providers]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Identificador único do provedor.
    pub id: String,

    /// Tipo de conteúdo que o provedor gera.
    pub kind: GenerationKind,

    pub protocol: Protocol,

    /// URL base da API.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Nome do modelo enviado ao provedor.
    #[serde(default)]
    pub model: Option<String>,

    /// Variável de ambiente que contém a chave da API.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Posição na cadeia de fallback; valores menores vêm primeiro.
    #[serde(default)]
    pub priority: u32,

    /// Tempo máximo de cada chamada, em milissegundos.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retentativas no mesmo provedor antes de passar ao próximo.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Teto do backoff em milissegundos.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Roteiro de respostas (apenas `protocol = "simulated"`).
    #[serde(default)]
    pub script: Vec<SimStep>,
}

// Valor padrão do timeout por chamada: 30s.
fn default_timeout_ms() -> u64 {
    30_000
}

// Valor padrão para retentativas máximas: 2.
fn default_max_retries() -> u32 {
    2
}

// Valor padrão para o atraso base: 1000ms.
fn default_backoff_base_ms() -> u64 {
    1000
}

// Valor padrão para o teto do backoff: 30s.
fn default_backoff_cap_ms() -> u64 {
    30_000
}

impl ProviderConfig {
    /// Cria um provedor simulado com os valores padrão.
    pub fn simulated(id: &str, kind: GenerationKind, script: Vec<SimStep>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            protocol: Protocol::Simulated,
            endpoint: None,
            model: None,
            api_key_env: None,
            priority: 0,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            script,
        }
    }

    /// Dados de política usados pelo roteador e pelo motor de retentativas.
    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor::new(self.id.clone(), self.kind)
            .with_priority(self.priority)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_retries(self.max_retries)
            .with_backoff(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_cap_ms),
            )
    }

    /// Lê a chave da API da variável configurada.
    ///
    /// Retorna `Ok(None)` quando o provedor não usa chave e erro quando a
    /// variável está ausente ou vazia.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        self.resolve_api_key_with(|var| std::env::var(var).ok())
    }

    /// Como [`resolve_api_key`](Self::resolve_api_key), mas lê a variável
    /// através de `lookup`.
    pub fn resolve_api_key_with(
        &self,
        lookup: impl FnOnce(&str) -> Option<String>,
    ) -> Result<Option<String>> {
        let Some(var) = &self.api_key_env else {
            return Ok(None);
        };
        match lookup(var) {
            Some(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ => Err(GenrelayError::Config(format!(
                "environment variable {var} for provider {} is not set",
                self.id
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GenrelayError::Config("provider id must not be empty".into()));
        }
        if self.protocol.needs_endpoint() && self.endpoint.is_none() {
            return Err(GenrelayError::Config(format!(
                "provider {} requires an endpoint",
                self.id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(GenrelayError::Config(format!(
                "provider {}: timeout_ms must be positive",
                self.id
            )));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(GenrelayError::Config(format!(
                "provider {}: backoff_cap_ms must be >= backoff_base_ms",
                self.id
            )));
        }
        Ok(())
    }
}

/// Configuração de nível superior carregada de `genrelay.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenrelayConfig {
    /// Quanto tempo `run` espera por um job de texto, em milissegundos.
    #[serde(default = "default_text_wait_ms")]
    pub text_wait_ms: u64,

    /// Intervalo entre consultas de status de tarefas assíncronas.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tempo máximo acompanhando uma tarefa assíncrona.
    #[serde(default = "default_track_timeout_ms")]
    pub track_timeout_ms: u64,

    /// Provedores na ordem de declaração.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

// Valor padrão da espera de texto: 15s.
fn default_text_wait_ms() -> u64 {
    15_000
}

// Valor padrão do intervalo de consulta: 3s.
fn default_poll_interval_ms() -> u64 {
    3_000
}

// Valor padrão do acompanhamento de tarefas: 10 minutos.
fn default_track_timeout_ms() -> u64 {
    600_000
}

impl Default for GenrelayConfig {
    fn default() -> Self {
        Self {
            text_wait_ms: default_text_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            track_timeout_ms: default_track_timeout_ms(),
            providers: Vec::new(),
        }
    }
}

impl GenrelayConfig {
    /// Carrega a configuração.
    ///
    /// Ordem de precedência do caminho: argumento explícito, depois
    /// `GENRELAY_CONFIG`, depois `genrelay.toml` no diretório atual. Só o
    /// caminho padrão pode faltar; nesse caso usa os valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let path = match explicit {
            Some(path) => path,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    debug!("no {DEFAULT_CONFIG_PATH} found, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        debug!(path = %path.display(), "loading configuration");
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            GenrelayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Interpreta e valida um documento TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Verifica ids únicos, endpoints obrigatórios e limites de backoff.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(GenrelayError::Config("poll_interval_ms must be positive".into()));
        }
        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !seen.insert(provider.id.as_str()) {
                return Err(GenrelayError::Config(format!(
                    "duplicate provider id: {}",
                    provider.id
                )));
            }
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            text_wait: Duration::from_millis(self.text_wait_ms),
            tracking: TrackingSettings {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                track_timeout: Duration::from_millis(self.track_timeout_ms),
            },
        }
    }

    /// Configuração embutida do comando `demo`: provedores simulados, um
    /// deles sempre limitado por taxa, para exercitar retentativa e fallback.
    pub fn demo() -> Self {
        let mut busy = ProviderConfig::simulated("sim-busy", GenerationKind::Text, vec![SimStep::Fail(429)]);
        busy.max_retries = 1;
        busy.backoff_base_ms = 300;
        busy.backoff_cap_ms = 1_000;

        let mut steady = ProviderConfig::simulated(
            "sim-steady",
            GenerationKind::Text,
            vec![SimStep::Slow(Duration::from_millis(400))],
        );
        steady.priority = 1;

        let video = ProviderConfig::simulated("sim-video", GenerationKind::Video, Vec::new());

        let mut flaky_tts = ProviderConfig::simulated(
            "sim-tts",
            GenerationKind::Audio,
            vec![SimStep::Fail(503), SimStep::Ok],
        );
        flaky_tts.backoff_base_ms = 200;

        Self {
            text_wait_ms: 10_000,
            poll_interval_ms: 500,
            track_timeout_ms: 30_000,
            providers: vec![busy, steady, video, flaky_tts],
        }
    }
}
