//! Tipos de dados das APIs dos provedores de geração.
//!
//! Cobre três formatos de fio: chat completions compatível com OpenAI
//! (incluindo o envelope `input/parameters` do Qwen), o histórico de tarefas
//! do ComfyUI e a API genérica de tarefas assíncronas usada por TTS e vídeo
//! hospedado. Todas as structs derivam `Serialize`/`Deserialize` conforme o
//! sentido em que trafegam.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::request::{GenerationKind, Payload};

/// Corpo da requisição para `POST {endpoint}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Uma mensagem da conversa: papel ("system", "user", "assistant") e texto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Corpo da requisição no dialeto DashScope (Qwen).
#[derive(Debug, Clone, Serialize)]
pub struct QwenRequest {
    pub model: String,
    pub input: QwenInput,
    pub parameters: QwenParameters,
}

#[derive(Debug, Clone, Serialize)]
pub struct QwenInput {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QwenParameters {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Formatos de resposta aceitos dos provedores de texto.
///
/// A ordem das variantes é a ordem de tentativa na desserialização
/// (`untagged`): primeiro o formato OpenAI, depois o Qwen, e por fim os
/// formatos planos `text` e `content`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompletionBody {
    Choices { choices: Vec<Choice> },
    Output { output: OutputText },
    Text { text: String },
    Content { content: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputText {
    pub text: String,
}

impl CompletionBody {
    /// Extrai o texto gerado, descartando espaços nas bordas.
    pub fn into_text(self) -> Option<String> {
        let text = match self {
            CompletionBody::Choices { choices } => choices.into_iter().next()?.message.content,
            CompletionBody::Output { output } => output.text,
            CompletionBody::Text { text } => text,
            CompletionBody::Content { content } => content,
        };
        Some(text.trim().to_string())
    }
}

/// Resposta de `POST {endpoint}/prompt` do ComfyUI.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptAccepted {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Resposta de `GET {endpoint}/history/{id}`: mapa do id da tarefa para a entrada.
/// O mapa vem vazio enquanto a tarefa está na fila.
pub type History = HashMap<String, HistoryEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: HistoryStatus,
    #[serde(default)]
    pub outputs: HashMap<String, NodeOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    /// "success" ou "error" quando a execução termina.
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

/// Arquivos produzidos por um nó do workflow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub videos: Vec<OutputFile>,
    #[serde(default)]
    pub gifs: Vec<OutputFile>,
    #[serde(default)]
    pub images: Vec<OutputFile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputFile {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
}

/// Corpo de `POST {endpoint}/tasks` na API genérica de tarefas.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSubmission<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub kind: GenerationKind,
    pub input: &'a Payload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskAccepted {
    #[serde(alias = "id")]
    pub task_id: String,
}

/// Estado de uma tarefa na API genérica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[serde(alias = "pending")]
    Queued,
    #[serde(alias = "processing")]
    Running,
    #[serde(alias = "completed")]
    Succeeded,
    #[serde(alias = "error")]
    Failed,
    #[serde(other)]
    Unknown,
}

/// Resposta de `GET {endpoint}/tasks/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    /// Percentual de 0 a 100, quando o provedor informa.
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskOutput {
    pub url: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
}
