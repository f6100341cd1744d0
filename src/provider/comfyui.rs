use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::types::{History, HistoryEntry, OutputFile, PromptAccepted};
use super::{
    FailureDescriptor, MediaArtifact, ProviderAdapter, ProviderOutput, RawOutcome, TrackOutcome,
    failure_from_response,
};
use crate::request::{GenerationRequest, Payload};

const NEGATIVE_PROMPT: &str = "static, still, frozen, motionless, blurry, low quality, distorted, \
                               watermark, text, error, ugly, deformed";
const MAX_FPS: u32 = 16;

/// Text-to-video on a ComfyUI server running the Wan 2.2 four-step LoRA workflow.
pub struct ComfyUiAdapter {
    id: String,
    base_url: String,
    client: Client,
}

/// Frame geometry derived from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    width: u32,
    height: u32,
    frames: u32,
    fps: u32,
}

impl Geometry {
    fn for_request(duration_secs: u32, width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.clamp(640, 1024),
            height: height.clamp(640, 1024),
            frames: (duration_secs * 16).clamp(48, 160),
            fps: fps.min(MAX_FPS),
        }
    }
}

impl ComfyUiAdapter {
    pub fn new(id: String, base_url: String, client: Client) -> Self {
        Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn workflow(&self, prompt: &str, geometry: Geometry, seed: Option<i64>) -> serde_json::Value {
        let prefix = format!("wan_video_{}", &Uuid::new_v4().simple().to_string()[..8]);
        json!({
            "71": {
                "class_type": "CLIPLoader",
                "inputs": {"clip_name": "umt5_xxl_fp8_e4m3fn_scaled.safetensors", "type": "wan", "device": "default"}
            },
            "73": {
                "class_type": "VAELoader",
                "inputs": {"vae_name": "wan_2.1_vae.safetensors"}
            },
            "75": {
                "class_type": "UNETLoader",
                "inputs": {"unet_name": "wan2.2_t2v_high_noise_14B_fp8_scaled.safetensors", "weight_dtype": "default"}
            },
            "77": {
                "class_type": "LoRALoader",
                "inputs": {
                    "lora_name": "wan2.2_t2v_lightx2v_4steps_lora_v1.1_high_noise.safetensors",
                    "strength_model": 1.0,
                    "strength_clip": 1.0
                }
            },
            "79": {
                "class_type": "WanVideoT2V",
                "inputs": {
                    "prompt": prompt,
                    "negative_prompt": NEGATIVE_PROMPT,
                    "width": geometry.width,
                    "height": geometry.height,
                    "num_frames": geometry.frames,
                    "steps": 4,
                    "cfg": 1.0,
                    "shift": 5.0,
                    "seed": seed.unwrap_or(-1),
                    "context_frames": 16,
                    "context_overlap": 4
                }
            },
            "81": {
                "class_type": "VAEEncode",
                "inputs": {"samples": ["79", 0], "vae": ["73", 0]}
            },
            "83": {
                "class_type": "CreateVideo",
                "inputs": {"fps": geometry.fps, "images": ["81", 0], "loop_count": 0}
            },
            "85": {
                "class_type": "SaveVideo",
                "inputs": {
                    "filename_prefix": prefix,
                    "format": "mp4",
                    "codec": "h264",
                    "fps": geometry.fps,
                    "crf": 23,
                    "video": ["83", 0]
                }
            }
        })
    }

    /// Download URL of an output file, with the query properly encoded.
    fn view_url(&self, file: &OutputFile) -> Option<String> {
        let mut url = Url::parse(&format!("{}/view", self.base_url.trim_end_matches('/'))).ok()?;
        url.query_pairs_mut()
            .append_pair("filename", &file.filename)
            .append_pair("subfolder", &file.subfolder)
            .append_pair("type", file.file_type.as_deref().unwrap_or("output"));
        Some(url.to_string())
    }

    fn interpret(&self, entry: &HistoryEntry) -> TrackOutcome {
        match entry.status.status_str.as_deref() {
            Some("error") => {
                let detail = entry
                    .status
                    .messages
                    .last()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "execution error".to_string());
                TrackOutcome::Rejected(FailureDescriptor::http(500, detail))
            }
            Some("success") => {
                let Some(file) = first_output(entry) else {
                    return TrackOutcome::Rejected(FailureDescriptor::http(
                        500,
                        "task finished without an output file",
                    ));
                };
                match self.view_url(file) {
                    Some(location) => TrackOutcome::Finished(MediaArtifact {
                        location,
                        duration_secs: None,
                        size_bytes: None,
                        format: file.filename.rsplit_once('.').map(|(_, ext)| ext.to_string()),
                    }),
                    None => TrackOutcome::Rejected(FailureDescriptor::http(
                        500,
                        format!("invalid base url {}", self.base_url),
                    )),
                }
            }
            _ => TrackOutcome::Running { progress: None },
        }
    }
}

/// Videos win over gifs, gifs over still images.
fn first_output(entry: &HistoryEntry) -> Option<&OutputFile> {
    let outputs = || entry.outputs.values();
    outputs()
        .find_map(|o| o.videos.first())
        .or_else(|| outputs().find_map(|o| o.gifs.first()))
        .or_else(|| outputs().find_map(|o| o.images.first()))
}

#[async_trait]
impl ProviderAdapter for ComfyUiAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip_all, fields(provider = %self.id))]
    async fn call(&self, request: &GenerationRequest) -> RawOutcome {
        let Payload::Video {
            prompt,
            duration_secs,
            width,
            height,
            fps,
            seed,
            ..
        } = &request.payload
        else {
            return RawOutcome::Failure(FailureDescriptor::http(
                400,
                format!("{} only serves video generation", self.id),
            ));
        };

        let geometry = Geometry::for_request(*duration_secs, *width, *height, *fps);
        let workflow = self.workflow(prompt, geometry, *seed);
        debug!(?geometry, "submitting workflow");

        let response = match self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&json!({ "prompt": workflow }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return RawOutcome::Failure(e.into()),
        };

        if !response.status().is_success() {
            return RawOutcome::Failure(failure_from_response(response).await);
        }

        match response.json::<PromptAccepted>().await {
            Ok(PromptAccepted {
                prompt_id: Some(token),
                ..
            }) => RawOutcome::Success(ProviderOutput::Accepted { token }),
            // ComfyUI reports workflow validation problems in a 200 body.
            Ok(PromptAccepted { error, .. }) => RawOutcome::Failure(FailureDescriptor::http(
                422,
                error.map(|e| e.to_string()).unwrap_or_else(|| "no prompt_id returned".into()),
            )),
            Err(e) => RawOutcome::Failure(FailureDescriptor::transport(format!(
                "unreadable prompt response: {e}"
            ))),
        }
    }

    #[instrument(skip_all, fields(provider = %self.id, token = %token))]
    async fn status(&self, token: &str) -> TrackOutcome {
        let response = match self
            .client
            .get(format!("{}/history/{token}", self.base_url))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return TrackOutcome::Unreachable(e.into()),
        };

        if !response.status().is_success() {
            return TrackOutcome::Unreachable(failure_from_response(response).await);
        }

        match response.json::<History>().await {
            Ok(history) => match history.get(token) {
                Some(entry) => self.interpret(entry),
                None => TrackOutcome::Running { progress: None },
            },
            Err(e) => TrackOutcome::Unreachable(FailureDescriptor::transport(format!(
                "unreadable history: {e}"
            ))),
        }
    }
}
