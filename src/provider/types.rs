//! Tipos de dados da geração de conteúdo.
//!
//! [`GenerationRequest`] e [`Generation`] formam o contrato neutro entre o
//! núcleo e qualquer provedor. As demais structs espelham o formato JSON do
//! endpoint `v1/messages` usado pelo [`HttpProvider`](super::HttpProvider).

use serde::{Deserialize, Serialize};

use crate::state_machine::JobInput;

/// Pedido de geração: a entrada original do job mais instruções opcionais
/// de correção anexadas por um resgate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub input: JobInput,
    pub instructions: Option<String>,
}

impl GenerationRequest {
    pub fn new(input: JobInput) -> Self {
        Self {
            input,
            instructions: None,
        }
    }

    pub fn with_instructions(input: JobInput, instructions: String) -> Self {
        Self {
            input,
            instructions: Some(instructions),
        }
    }
}

/// Resultado de uma chamada de geração bem-sucedida.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
    /// Nome do provedor que produziu o texto.
    pub provider: String,
}

/// Corpo da requisição para o endpoint `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    /// Identificador do modelo (ex.: "claude-sonnet-4-5-20250929").
    pub model: String,
    /// Número máximo de tokens na resposta.
    pub max_tokens: u32,
    /// Instrução de sistema; omitida do JSON quando ausente.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

/// Uma única mensagem da conversa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Papel do remetente: "user" ou "assistant".
    pub role: String,
    pub content: String,
}

/// Resposta retornada pelo endpoint `/v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    /// Blocos de conteúdo na resposta (normalmente texto).
    pub content: Vec<ContentBlock>,
    pub model: String,
    /// Motivo da parada da geração (ex.: "end_turn", "max_tokens").
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatena todos os blocos de texto da resposta.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.content_type == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Um bloco de conteúdo. O campo `content_type` é serializado como `"type"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

/// Estatísticas de consumo de tokens para uma chamada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_system_prompt() {
        let req = MessagesRequest {
            model: "m".into(),
            max_tokens: 10,
            system: None,
            messages: vec![Message {
                role: "user".into(),
                content: "Hello".into(),
            }],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("system"));
    }

    #[test]
    fn messages_response_deserialize_from_api_format() {
        let api_json = r#"{
            "id": "msg_123",
            "content": [
                {"type": "text", "text": "Part one. "},
                {"type": "text", "text": "Part two."}
            ],
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.text(), "Part one. Part two.");
        assert_eq!(resp.usage.output_tokens, 15);
    }

    #[test]
    fn content_block_type_field_renames_correctly() {
        let block = ContentBlock {
            content_type: "text".into(),
            text: "hello".into(),
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type""#));
        assert!(!json.contains("content_type"));
    }

    #[test]
    fn non_text_blocks_are_skipped() {
        let json = r#"{
            "id": "msg_1",
            "content": [{"type": "tool_use"}, {"type": "text", "text": "body"}],
            "model": "m",
            "stop_reason": null,
            "usage": {"input_tokens": 0, "output_tokens": 0}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text(), "body");
        assert_eq!(resp.stop_reason, None);
    }
}
