#[path = "../src/classfile/fixture.rs"]
mod fixture;

use fixture::{ClassFixture, Elem, ldc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_token_replacer_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn run_json(args: &[&str]) -> anyhow::Result<Value> {
    let out = Command::new(env!("CARGO_BIN_EXE_class-token-replacer"))
        .args(args)
        .output()?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

fn versioned_class(name: &str) -> Vec<u8> {
    let mut fx = ClassFixture::new(name);
    let id = fx.string("app-${NAME}-${VER}");
    fx.field("ID", "Ljava/lang/String;", Some(id));
    let banner = fx.string("v${VER}");
    let mut code = ldc(banner);
    code.extend_from_slice(&[0x57, 0xB1]);
    let m = fx.method("banner", "()V", code);
    let ann = fx.annotation("Ldemo/Built;", vec![("by", Elem::Str("${NAME}"))]);
    fx.method_annotation(m, true, ann);
    fx.finish()
}

fn plain_class(name: &str) -> Vec<u8> {
    let mut fx = ClassFixture::new(name);
    let s = fx.string("no tokens here");
    fx.field("TEXT", "Ljava/lang/String;", Some(s));
    fx.finish()
}

fn site_values(class_file: &Path) -> anyhow::Result<Vec<String>> {
    let path = class_file.to_string_lossy().to_string();
    let sites = run_json(&["sites", &path])?;
    Ok(sites
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|s| s["value"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default())
}

#[test]
fn shadow_mode_writes_changed_classes_only() -> anyhow::Result<()> {
    let base = temp_dir("shadow");
    let input = base.join("classes");
    let output = base.join("shadow");
    std::fs::create_dir_all(&output)?;
    let app = versioned_class("com/acme/App");
    write_file(&input.join("com/acme/App.class"), &app)?;
    write_file(&input.join("com/acme/Plain.class"), &plain_class("com/acme/Plain"))?;
    let tokens = base.join("tokens.json");
    write_file(&tokens, br#"{"${VER}": "1.2.3", "${NAME}": "demo"}"#)?;

    let input_arg = input.to_string_lossy().to_string();
    let output_arg = output.to_string_lossy().to_string();
    let tokens_arg = tokens.to_string_lossy().to_string();
    let report = run_json(&[
        "replace",
        &input_arg,
        "--tokens",
        &tokens_arg,
        "--output",
        &output_arg,
        "--quiet",
    ])?;

    assert_eq!(report["mode"], "shadow");
    assert_eq!(report["scanned"], 2);
    assert_eq!(report["rewritten"], 1);
    assert_eq!(report["unchanged"], 1);
    assert_eq!(report["files"][0]["rewritten_sites"], 3);

    let written = output.join("com/acme/App.class");
    assert_eq!(
        site_values(&written)?,
        vec!["v1.2.3", "demo", "app-demo-1.2.3"]
    );
    assert!(!output.join("com/acme/Plain.class").exists());
    assert_eq!(std::fs::read(input.join("com/acme/App.class"))?, app);

    std::fs::remove_dir_all(&base)?;
    Ok(())
}

#[test]
fn in_place_mode_rewrites_and_skips_malformed() -> anyhow::Result<()> {
    let base = temp_dir("in_place");
    write_file(&base.join("a/App.class"), &versioned_class("a/App"))?;
    write_file(&base.join("a/Broken.class"), b"\xCA\xFE\xBA\xBEjunk")?;
    let plain = plain_class("a/Plain");
    write_file(&base.join("a/Plain.class"), &plain)?;

    let base_arg = base.to_string_lossy().to_string();
    let report = run_json(&[
        "replace",
        &base_arg,
        "-t",
        "${VER}=2.0",
        "-t",
        "${NAME}=x",
        "--quiet",
    ])?;

    assert_eq!(report["mode"], "in-place");
    assert_eq!(report["rewritten"], 1);
    assert_eq!(report["skipped"], 1);
    let files = report["files"].as_array().cloned().unwrap_or_default();
    let skipped: Vec<&Value> = files.iter().filter(|f| f["status"] == "skipped").collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["error_kind"], "malformed-class");

    assert_eq!(
        site_values(&base.join("a/App.class"))?,
        vec!["v2.0", "x", "app-x-2.0"]
    );
    assert_eq!(std::fs::read(base.join("a/Plain.class"))?, plain);

    let again = run_json(&["replace", &base_arg, "-t", "${VER}=2.0", "--quiet"])?;
    assert_eq!(again["rewritten"], 0);

    std::fs::remove_dir_all(&base)?;
    Ok(())
}

#[test]
fn strict_mode_fails_without_touching_files() -> anyhow::Result<()> {
    let base = temp_dir("strict");
    let app = versioned_class("App");
    write_file(&base.join("App.class"), &app)?;
    write_file(&base.join("Broken.class"), b"nope")?;

    let base_arg = base.to_string_lossy().to_string();
    let result = run_json(&["replace", &base_arg, "-t", "${VER}=3", "--strict", "--quiet"]);
    assert!(result.is_err());
    assert_eq!(std::fs::read(base.join("App.class"))?, app);

    std::fs::remove_dir_all(&base)?;
    Ok(())
}

#[test]
fn output_inside_input_is_rejected() -> anyhow::Result<()> {
    let base = temp_dir("nested_output");
    let nested = base.join("out");
    std::fs::create_dir_all(&nested)?;

    let base_arg = base.to_string_lossy().to_string();
    let nested_arg = nested.to_string_lossy().to_string();
    let result = run_json(&["replace", &base_arg, "--output", &nested_arg]);
    assert!(result.is_err());

    std::fs::remove_dir_all(&base)?;
    Ok(())
}
