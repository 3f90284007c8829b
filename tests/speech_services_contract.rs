#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Transcription and speech synthesis API contract tests.

use friday::audio::{MicRecorder, SpeakerOutput, decode_wav, samples_to_wav};
use friday::config::{AudioConfig, SttConfig, TtsConfig};
use friday::error::AssistantError;
use friday::stt::HttpStt;
use friday::tts::HttpTts;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 0.05).sin() * 0.3)
        .collect()
}

fn stt_for(server: &MockServer, api_key: &str) -> HttpStt {
    let config = SttConfig {
        api_url: server.uri(),
        model: "whisper-test".to_owned(),
        language: Some("en".to_owned()),
        api_key: api_key.to_owned(),
    };
    HttpStt::new(&config, MicRecorder::new(&AudioConfig::default()))
}

fn tts_for(server: &MockServer) -> HttpTts {
    let config = TtsConfig {
        api_url: server.uri(),
        ..TtsConfig::default()
    };
    HttpTts::new(&config, SpeakerOutput::new(&AudioConfig::default()))
}

#[tokio::test]
async fn transcription_uploads_wav_form_and_trims_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  hello friday \n"})))
        .expect(1)
        .mount(&server)
        .await;

    let stt = stt_for(&server, "secret");
    let text = stt.transcribe_samples(&tone(1600), 16_000).await.unwrap();
    assert_eq!(text, "hello friday");

    let requests = server.received_requests().await.unwrap();
    let body = &requests[0].body;
    let needles: [&[u8]; 4] = [
        b"whisper-test",
        b"filename=\"audio.wav\"",
        b"RIFF",
        b"name=\"language\"",
    ];
    for needle in needles {
        assert!(
            body.windows(needle.len()).any(|w| w == needle),
            "multipart body is missing {:?}",
            String::from_utf8_lossy(needle)
        );
    }
}

#[tokio::test]
async fn silent_transcription_is_empty_not_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": ""})))
        .mount(&server)
        .await;

    let stt = stt_for(&server, "");
    let text = stt.transcribe_samples(&[0.0; 1600], 16_000).await.unwrap();
    assert!(text.is_empty());
}

#[tokio::test]
async fn transcription_server_error_is_an_stt_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let stt = stt_for(&server, "");
    let err = stt.transcribe_samples(&tone(160), 16_000).await.unwrap_err();
    match err {
        AssistantError::Stt(msg) => assert!(msg.contains("model not loaded"), "{msg}"),
        other => panic!("expected Stt error, got {other:?}"),
    }
}

#[tokio::test]
async fn synthesis_requests_wav_and_decodes_samples() {
    let server = MockServer::start().await;
    let wav = samples_to_wav(&tone(2400), 24_000).unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(json!({
            "model": "kokoro",
            "input": "Good evening.",
            "voice": "af_sarah",
            "response_format": "wav"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/wav")
                .set_body_bytes(wav.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (samples, rate) = tts_for(&server).synthesize("Good evening.").await.unwrap();
    let (expected, expected_rate) = decode_wav(&wav).unwrap();
    assert_eq!(rate, expected_rate);
    assert_eq!(samples.len(), expected.len());
}

#[tokio::test]
async fn undecodable_speech_audio_is_a_tts_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a wav file".to_vec()))
        .mount(&server)
        .await;

    let err = tts_for(&server).synthesize("hi").await.unwrap_err();
    assert!(matches!(err, AssistantError::Tts(_)));
}
