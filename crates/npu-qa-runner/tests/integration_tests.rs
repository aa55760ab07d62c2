//! Integration tests for npu-qa-runner
//!
//! Drives the harness end to end against the mock runtime: artifact checks,
//! backend resolution, timed execution, validation, decoding and the final
//! report.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use npu_qa_decode::QuantParams;
use npu_qa_runner::{
    Backend, Harness, HarnessConfig, MockRuntime, OutputTensor, RunReport, Stack, Status,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DICTIONARY: &str = "J\nO\nI\nN\nT\n";

fn models_dir(files: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in files {
        let contents: &[u8] = if name.ends_with(".txt") {
            DICTIONARY.as_bytes()
        } else {
            b"placeholder"
        };
        fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

fn config(stack: Stack, dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::for_stack(stack);
    config.models_dir = dir.to_path_buf();
    config.delegate.enabled = false;
    config.repeat_count = 5;
    config
}

fn tests(report: &RunReport) -> &npu_qa_runner::TestReport {
    match report {
        RunReport::Tests(tests) => tests,
        RunReport::Aborted(v) => panic!("run aborted: {v:?}"),
    }
}

/// One-hot-ish [1, T, 6] distribution for a class sequence
fn sequence_output(classes: &[usize]) -> OutputTensor {
    let width = 6;
    let mut data = vec![0.02_f32; classes.len() * width];
    for (t, &c) in classes.iter().enumerate() {
        data[t * width + c] = 0.9;
    }
    OutputTensor::new(vec![1, classes.len(), width], data)
}

#[test]
fn test_empty_models_dir_skips_everything() {
    let dir = models_dir(&[]);
    let runtime = MockRuntime::new().native_accelerator();
    let probe = runtime.probe();

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let tests = tests(&report);
    assert_eq!(tests.get("mobilenet").unwrap().status, Status::Skip);
    assert_eq!(tests.get("ocr").unwrap().status, Status::Skip);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(probe.engines_created(), 0);
}

#[test]
fn test_logits_are_softmaxed_and_ranked() {
    let dir = models_dir(&["mobilenet_v1.rknn"]);
    let runtime = MockRuntime::new().native_accelerator().with_outputs(vec![OutputTensor::new(
        vec![1, 5],
        vec![0.1, 12.0, 0.3, 0.2, 11.5],
    )]);

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert_eq!(verdict.status, Status::Pass);

    let top5 = verdict.details.top5.as_ref().unwrap();
    let classes: Vec<_> = top5.iter().map(|p| p.class_id).collect();
    assert_eq!(classes, vec![1, 4, 2, 3, 0]);
    let total: f64 = top5.iter().map(|p| p.confidence).sum();
    assert!((total - 1.0).abs() < 1e-4);
    assert!(top5[0].confidence > 0.6 && top5[0].confidence < 0.65);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_quantized_output_is_dequantized() {
    let dir = models_dir(&["mobilenet_v1_1.0_224_quant.tflite"]);
    // stored values 0..=255 with scale 1/256: real scores stay below the
    // logit threshold, so no softmax
    let raw = vec![0.0, 3.0, 250.0, 10.0];
    let runtime = MockRuntime::new().with_outputs(vec![
        OutputTensor::new(vec![1, 4], raw).with_quant(QuantParams::new(1.0 / 256.0, 0)),
    ]);

    let report = Harness::new(config(Stack::Teflon, dir.path()), runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert_eq!(verdict.status, Status::Pass);
    let top = verdict.details.top5.as_ref().unwrap()[0];
    assert_eq!(top.class_id, 2);
    assert!((top.confidence - 250.0 / 256.0).abs() < 1e-6);
    assert_eq!(verdict.details.backend, Some(Backend::Cpu));
}

#[test]
fn test_load_failure_releases_engine() {
    let dir = models_dir(&["mobilenet_v1.rknn"]);
    let runtime = MockRuntime::new().native_accelerator().with_load_status(-6);
    let probe = runtime.probe();

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert_eq!(verdict.status, Status::Fail);
    assert_eq!(
        verdict.error.as_deref(),
        Some("Model load failed (ret=-6, mock status)")
    );
    assert_eq!(probe.inits(), 0);
    assert_eq!(probe.releases(), 1);
}

#[test]
fn test_init_failure_releases_engine() {
    let dir = models_dir(&["mobilenet_v1.rknn"]);
    let runtime = MockRuntime::new().native_accelerator().with_init_status(-3);
    let probe = runtime.probe();

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert!(
        verdict
            .error
            .as_deref()
            .unwrap()
            .starts_with("NPU runtime init failed (ret=-3")
    );
    assert_eq!(probe.invokes(), 0);
    assert_eq!(probe.releases(), 1);
}

#[test]
fn test_mid_run_failure_reports_partial_latency() {
    let dir = models_dir(&["mobilenet_v1.rknn"]);
    let runtime = MockRuntime::new()
        .native_accelerator()
        .with_invoke_failure_at(3);
    let probe = runtime.probe();

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert_eq!(verdict.status, Status::Fail);
    assert!(verdict.error.as_deref().unwrap().starts_with("Inference failed: "));
    assert!(verdict.details.inference_ms.is_some());
    assert!(verdict.details.top5.is_none());
    assert_eq!(probe.releases(), 1);
}

#[test]
fn test_warmup_failure_has_no_latency() {
    let dir = models_dir(&["mobilenet_v1.rknn"]);
    let runtime = MockRuntime::new()
        .native_accelerator()
        .with_invoke_failure_at(0);

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert!(
        verdict
            .error
            .as_deref()
            .unwrap()
            .starts_with("Warm-up inference failed: ")
    );
    assert!(verdict.details.inference_ms.is_none());
}

#[test]
fn test_delegate_failure_falls_back_to_cpu() {
    let dir = models_dir(&["mobilenet_v1_1.0_224_quant.tflite", "libteflon.so"]);
    let mut config = config(Stack::Teflon, dir.path());
    config.delegate.enabled = true;
    config.delegate.search_paths = vec![dir.path().join("libteflon.so")];
    config.delegate.search_root = None;

    let runtime = MockRuntime::new().with_delegate_failure("undefined symbol: teflon_init");
    let report = Harness::new(config, runtime).run();
    let verdict = tests(&report).get("mobilenet").unwrap();

    assert_eq!(verdict.status, Status::Pass);
    assert_eq!(verdict.details.backend, Some(Backend::Cpu));
    assert_eq!(
        verdict.details.delegate_error.as_deref(),
        Some("undefined symbol: teflon_init")
    );
    assert_eq!(
        verdict.details.delegate_path.as_deref(),
        Some(dir.path().join("libteflon.so").as_path())
    );
}

#[test]
fn test_delegate_found_by_tree_search() {
    let dir = models_dir(&["mobilenet_v1_1.0_224_quant.tflite"]);
    let nested = dir.path().join("lib/aarch64/mesa");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("libteflon.so"), b"").unwrap();

    let mut config = config(Stack::Teflon, dir.path());
    config.delegate.enabled = true;
    config.delegate.search_paths = vec![dir.path().join("nowhere/libteflon.so")];
    config.delegate.search_root = Some(dir.path().join("lib"));

    let report = Harness::new(config, MockRuntime::new()).run();
    let verdict = tests(&report).get("mobilenet").unwrap();
    assert_eq!(verdict.details.backend, Some(Backend::Accelerator));
    assert_eq!(
        verdict.details.delegate_path.as_deref(),
        Some(nested.join("libteflon.so").as_path())
    );
}

#[test]
fn test_ocr_missing_dictionary_is_skip() {
    let dir = models_dir(&["mobilenet_v1.rknn", "ppocrv4_rec.rknn"]);
    let runtime = MockRuntime::new().native_accelerator();

    let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
    let verdict = tests(&report).get("ocr").unwrap();
    assert_eq!(verdict.status, Status::Skip);
    assert!(
        verdict
            .error
            .as_deref()
            .unwrap()
            .starts_with("Character dictionary not found at ")
    );
    // optional case never affects the exit code
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_ocr_missing_image_is_skip() {
    let dir = models_dir(&["mobilenet_v1.rknn", "ppocrv4_rec.rknn", "ppocr_keys_v1.txt"]);
    let report = Harness::new(
        config(Stack::Rknpu, dir.path()),
        MockRuntime::new().native_accelerator(),
    )
    .run();
    let verdict = tests(&report).get("ocr").unwrap();
    assert_eq!(verdict.status, Status::Skip);
    assert!(verdict.error.as_deref().unwrap().starts_with("Test image not found at "));
}

#[test]
fn test_report_json_shape() {
    let dir = models_dir(&["mobilenet_v1.rknn"]);
    let report = Harness::new(
        config(Stack::Rknpu, dir.path()),
        MockRuntime::new().native_accelerator(),
    )
    .run();

    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(value["mobilenet"]["status"], "PASS");
    assert_eq!(value["mobilenet"]["backend"], "npu");
    assert!(value["mobilenet"]["top5"].as_array().unwrap().len() == 5);
    assert!(value["mobilenet"].get("error").is_none());
    assert_eq!(value["ocr"]["status"], "SKIP");
}

#[cfg(feature = "image-decode")]
mod recognition {
    use super::*;
    use image::{Rgb, RgbImage};

    fn ocr_dir() -> TempDir {
        let dir = models_dir(&["mobilenet_v1.rknn", "ppocrv4_rec.rknn", "ppocr_keys_v1.txt"]);
        RgbImage::from_pixel(160, 32, Rgb([255, 255, 255]))
            .save(dir.path().join("ocr_test_image.png"))
            .unwrap();
        dir
    }

    #[test]
    fn test_ocr_matches_expected_text() {
        let dir = ocr_dir();
        let runtime = MockRuntime::new()
            .native_accelerator()
            .with_model_outputs("ppocrv4_rec.rknn", vec![sequence_output(&[1, 1, 0, 2, 3, 0, 4, 5, 5])]);
        let probe = runtime.probe();

        let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
        let verdict = tests(&report).get("ocr").unwrap();
        assert_eq!(verdict.status, Status::Pass, "{verdict:?}");
        assert_eq!(verdict.details.recognized.as_deref(), Some("JOINT"));
        assert_eq!(verdict.details.expected.as_deref(), Some("JOINT"));
        assert_eq!(verdict.details.matched, Some(true));
        assert_eq!(verdict.details.output_shape, Some(vec![1, 9, 6]));
        assert_eq!(probe.releases(), 2);
    }

    #[test]
    fn test_ocr_mismatch_is_warn() {
        let dir = ocr_dir();
        let runtime = MockRuntime::new()
            .native_accelerator()
            .with_model_outputs("ppocrv4_rec.rknn", vec![sequence_output(&[1, 2, 2, 4, 5])]);

        let report = Harness::new(config(Stack::Rknpu, dir.path()), runtime).run();
        let verdict = tests(&report).get("ocr").unwrap();
        assert_eq!(verdict.status, Status::Warn);
        assert_eq!(verdict.details.recognized.as_deref(), Some("JONT"));
        assert_eq!(verdict.details.matched, Some(false));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_corrupt_image_is_fail() {
        let dir = models_dir(&["mobilenet_v1.rknn", "ppocrv4_rec.rknn", "ppocr_keys_v1.txt"]);
        fs::write(dir.path().join("ocr_test_image.png"), b"garbage").unwrap();

        let report = Harness::new(
            config(Stack::Rknpu, dir.path()),
            MockRuntime::new().native_accelerator(),
        )
        .run();
        let verdict = tests(&report).get("ocr").unwrap();
        assert_eq!(verdict.status, Status::Fail);
        assert!(verdict.error.as_deref().unwrap().starts_with("Could not load test image"));
    }

    #[test]
    fn test_ocr_match_ignores_surrounding_whitespace() {
        let dir = ocr_dir();
        let mut config = config(Stack::Rknpu, dir.path());
        if let Some(rec) = config.recognition.as_mut() {
            rec.expected_text = Some(" JOINT ".to_string());
        }
        let runtime = MockRuntime::new()
            .native_accelerator()
            .with_model_outputs("ppocrv4_rec.rknn", vec![sequence_output(&[1, 2, 3, 4, 5])]);

        let report = Harness::new(config, runtime).run();
        assert_eq!(tests(&report).get("ocr").unwrap().status, Status::Pass);
    }
}
