use super::*;

fn backend() -> OpenAiCompletionsBackend {
    OpenAiCompletionsBackend::new(
        reqwest::Client::new(),
        "http://100.64.0.1:8000/",
        None,
        ModelNames {
            base: "qwen2-7b-instruct".to_owned(),
            sft: "listener-sft".to_owned(),
            dpo: "listener-dpo".to_owned(),
        },
    )
}

fn params() -> SamplingParams {
    SamplingParams {
        max_tokens: 512,
        temperature: 0.9,
        top_p: 0.9,
        top_k: 50,
        seed: 1234,
    }
}

#[test]
fn test_request_body_carries_sampling_params() {
    let body = backend().build_request_body(
        "prompt text",
        ModelSelector::Adapter(Variant::Dpo),
        &params(),
    );

    assert_eq!(body["model"], "listener-dpo");
    assert_eq!(body["prompt"], "prompt text");
    assert_eq!(body["max_tokens"], 512);
    assert_eq!(body["temperature"], 0.9);
    assert_eq!(body["top_p"], 0.9);
    assert_eq!(body["top_k"], 50);
    assert_eq!(body["seed"], 1234);
    assert_eq!(body["stream"], false);
}

#[test]
fn test_model_name_per_selector() {
    let names = backend().models;
    assert_eq!(names.name_for(ModelSelector::Base), "qwen2-7b-instruct");
    assert_eq!(
        names.name_for(ModelSelector::Adapter(Variant::Sft)),
        "listener-sft"
    );
    assert_eq!(
        names.name_for(ModelSelector::Adapter(Variant::Dpo)),
        "listener-dpo"
    );
}

#[test]
fn test_trailing_slash_trimmed_from_base_url() {
    assert_eq!(backend().base_url, "http://100.64.0.1:8000");
}

#[test]
fn test_parse_response_first_choice_text() {
    let body = serde_json::json!({
        "id": "cmpl-1",
        "object": "text_completion",
        "created": 1700000000,
        "model": "listener-sft",
        "choices": [
            {"index": 0, "text": "【倾听者回复】：我在听。", "finish_reason": "stop"},
            {"index": 1, "text": "ignored", "finish_reason": "stop"}
        ]
    });
    let text = parse_response(body.to_string().as_bytes()).unwrap();
    assert_eq!(text, "【倾听者回复】：我在听。");
}

#[test]
fn test_parse_response_null_text_is_empty() {
    let body = r#"{"choices": [{"index": 0, "text": null}]}"#;
    assert_eq!(parse_response(body.as_bytes()).unwrap(), "");
}

#[test]
fn test_parse_response_no_choices() {
    let err = parse_response(br#"{"choices": []}"#).unwrap_err();
    assert!(matches!(err, BackendError::MalformedResponse(_)));
}

#[test]
fn test_parse_response_invalid_json() {
    let err = parse_response(b"not json").unwrap_err();
    assert!(matches!(err, BackendError::MalformedResponse(_)));
}
