//! Interface de linha de comando do genrelay baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (text, batch, video,
//! audio, providers, test-provider, demo) e flags globais (--config,
//! --provider, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::request::{GenerationRequest, OptimizeMode, Payload};

/// genrelay: despachante de geração de conteúdo com retentativa e fallback
/// entre provedores de IA.
#[derive(Debug, Parser)]
#[command(name = "genrelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: $GENRELAY_CONFIG ou genrelay.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Provedor preferido; vai para o início da cadeia de fallback.
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Modo de otimização aceito pela CLI, mapeado para [`OptimizeMode`].
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ModeArg {
    /// Texto mais vívido e envolvente.
    #[default]
    Creative,
    /// Tom preciso e profissional.
    Professional,
    /// Versão enxuta do texto.
    Concise,
    /// Otimizado para mecanismos de busca.
    Seo,
    /// Adaptado para redes sociais.
    Social,
}

impl From<ModeArg> for OptimizeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Creative => OptimizeMode::Creative,
            ModeArg::Professional => OptimizeMode::Professional,
            ModeArg::Concise => OptimizeMode::Concise,
            ModeArg::Seo => OptimizeMode::Seo,
            ModeArg::Social => OptimizeMode::Social,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Otimiza um texto.
    Text {
        /// Texto original.
        text: String,

        /// Estilo de otimização.
        #[arg(long, value_enum, default_value_t = ModeArg::Creative)]
        mode: ModeArg,

        /// Prompt próprio; `{original_text}` é substituído pelo texto.
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Otimiza vários textos, cada um em um job próprio.
    Batch {
        /// Textos originais.
        #[arg(required = true)]
        texts: Vec<String>,

        #[arg(long, value_enum, default_value_t = ModeArg::Creative)]
        mode: ModeArg,
    },

    /// Gera um vídeo a partir de um prompt.
    Video {
        /// Descrição do vídeo.
        prompt: String,

        /// Duração em segundos (1-30).
        #[arg(long, default_value_t = 5)]
        duration: u32,

        #[arg(long, default_value_t = 1024)]
        width: u32,

        #[arg(long, default_value_t = 576)]
        height: u32,

        /// Quadros por segundo (8-60).
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Semente fixa para resultados reproduzíveis.
        #[arg(long)]
        seed: Option<i64>,
    },

    /// Sintetiza fala a partir de um texto.
    Audio {
        text: String,

        /// Voz do provedor.
        #[arg(long)]
        voice: Option<String>,

        /// Velocidade da fala (0.5-2.0).
        #[arg(long, default_value_t = 1.0)]
        speed: f32,

        /// Formato do arquivo de saída.
        #[arg(long, default_value = "mp3")]
        format: String,
    },

    /// Lista os provedores configurados na ordem da cadeia.
    Providers,

    /// Testa a conexão com um provedor usando uma requisição de exemplo.
    TestProvider {
        /// Identificador do provedor.
        id: String,
    },

    /// Executa a demonstração com provedores simulados.
    Demo,
}

impl Command {
    /// Requisições do subcomando `batch`, na ordem recebida.
    pub fn batch_requests(&self, provider: Option<&str>) -> Vec<GenerationRequest> {
        let Command::Batch { texts, mode } = self else {
            return Vec::new();
        };
        texts
            .iter()
            .map(|text| {
                let request = GenerationRequest::text(text.clone(), (*mode).into());
                match provider {
                    Some(id) => request.with_provider(id),
                    None => request,
                }
            })
            .collect()
    }

    /// Constrói a requisição de geração correspondente ao subcomando.
    pub fn to_request(&self, provider: Option<&str>) -> Option<GenerationRequest> {
        let request = match self {
            Command::Text { text, mode, prompt } => GenerationRequest {
                payload: Payload::Text {
                    text: text.clone(),
                    mode: (*mode).into(),
                    custom_prompt: prompt.clone(),
                },
                provider_hint: None,
            },
            Command::Video {
                prompt,
                duration,
                width,
                height,
                fps,
                seed,
            } => {
                let mut request = GenerationRequest::video(prompt.clone());
                if let Payload::Video {
                    duration_secs,
                    width: w,
                    height: h,
                    fps: f,
                    seed: s,
                    ..
                } = &mut request.payload
                {
                    *duration_secs = *duration;
                    *w = *width;
                    *h = *height;
                    *f = *fps;
                    *s = *seed;
                }
                request
            }
            Command::Audio {
                text,
                voice,
                speed,
                format,
            } => {
                let mut request = GenerationRequest::audio(text.clone());
                if let Payload::Audio {
                    voice: v,
                    speed: s,
                    format: f,
                    ..
                } = &mut request.payload
                {
                    *v = voice.clone();
                    *s = *speed;
                    *f = format.clone();
                }
                request
            }
            Command::Batch { .. }
            | Command::Providers
            | Command::TestProvider { .. }
            | Command::Demo => return None,
        };
        Some(match provider {
            Some(id) => request.with_provider(id),
            None => request,
        })
    }
}
