//! End-to-end builds through the shell executor.

use std::sync::Arc;

use rulegraph_lib::cache::ArtifactCache;
use rulegraph_lib::execute::BuildStatus;
use rulegraph_lib::{DirArtifactCache, InMemoryArtifactCache};

use super::common::{TestProject, resolve, target};

const PIPELINE: &str = r#"[
  { "target": "//gen:upper", "kind": "genrule",
    "args": { "srcs": ["input.txt"], "cmd": "tr a-z A-Z < $SRCS > $OUT", "out": "upper.txt" } },
  { "target": "//gen:framed", "kind": "genrule",
    "args": { "srcs": ["//gen:upper"], "cmd": "printf '[%s]' \"$(cat $SRCS)\" > $OUT", "out": "framed.txt" } }
]"#;

fn dir_cache(project: &TestProject) -> Arc<dyn ArtifactCache> {
  Arc::new(DirArtifactCache::new(project.root().join("cache")))
}

#[tokio::test]
async fn genrule_pipeline_builds_then_hits_cache() {
  let project = TestProject::new();
  project.write_file("input.txt", "hello");
  let framed = target("//gen:framed");

  let engine = project.engine(resolve(PIPELINE), dir_cache(&project));
  let report = engine.build(std::slice::from_ref(&framed)).await.unwrap();
  assert!(report.is_success(), "{report:?}");
  assert_eq!(report.executed(), 2);
  assert_eq!(project.read_file("out/__root__/gen/framed/framed.txt"), "[HELLO]");

  // A fresh engine over the same cache directory rebuilds nothing.
  let engine = project.engine(resolve(PIPELINE), dir_cache(&project));
  let report = engine.build(std::slice::from_ref(&framed)).await.unwrap();
  assert!(report.is_success());
  assert_eq!(report.cache_hits(), 2);
  assert_eq!(report.executed(), 0);
}

#[tokio::test]
async fn changed_source_rebuilds_dependents() {
  let project = TestProject::new();
  project.write_file("input.txt", "hello");
  let framed = target("//gen:framed");

  let engine = project.engine(resolve(PIPELINE), dir_cache(&project));
  engine.build(std::slice::from_ref(&framed)).await.unwrap();
  let first_key = engine.rule_key(&framed).unwrap();

  project.write_file("input.txt", "goodbye");
  let engine = project.engine(resolve(PIPELINE), dir_cache(&project));
  assert_ne!(engine.rule_key(&framed).unwrap(), first_key);

  let report = engine.build(std::slice::from_ref(&framed)).await.unwrap();
  assert!(report.is_success());
  assert_eq!(report.executed(), 2);
  assert_eq!(project.read_file("out/__root__/gen/framed/framed.txt"), "[GOODBYE]");
}

#[tokio::test]
async fn apk_genrule_post_processes_prebuilt_apk() {
  let project = TestProject::new();
  project.write_file("apps/base.apk", "PK-base");
  project.write_file("apps/AndroidManifest.xml", "<manifest/>");

  let graph = resolve(
    r#"[
      { "target": "//apps:base", "kind": "prebuilt_apk",
        "args": { "apk": "apps/base.apk", "manifest": "apps/AndroidManifest.xml", "package_name": "com.example" } },
      { "target": "//apps:signed", "kind": "apk_genrule",
        "args": { "apk": "//apps:base", "cmd": "cp $APK $OUT && echo signed >> $OUT" } }
    ]"#,
  );
  let engine = project.engine(graph, Arc::new(InMemoryArtifactCache::new()));
  let report = engine.build(&[target("//apps:signed")]).await.unwrap();

  assert!(report.is_success(), "{report:?}");
  assert_eq!(report.built[&target("//apps:base")].status, BuildStatus::NothingToBuild);
  assert_eq!(report.built[&target("//apps:signed")].status, BuildStatus::Built);
  assert_eq!(
    project.read_file("out/__root__/apps/signed/signed.apk"),
    "PK-basesigned\n"
  );
}

#[tokio::test]
async fn failing_command_skips_only_its_dependents() {
  let project = TestProject::new();
  let graph = resolve(
    r#"[
      { "target": "//gen:broken", "kind": "genrule", "args": { "cmd": "exit 1", "out": "x" } },
      { "target": "//gen:after", "kind": "genrule",
        "args": { "srcs": ["//gen:broken"], "cmd": "cat $SRCS > $OUT", "out": "y" } },
      { "target": "//gen:fine", "kind": "genrule", "args": { "cmd": "echo ok > $OUT", "out": "ok.txt" } }
    ]"#,
  );
  let engine = project.engine(graph, Arc::new(InMemoryArtifactCache::new()));
  let report = engine
    .build(&[target("//gen:after"), target("//gen:fine")])
    .await
    .unwrap();

  assert!(!report.is_success());
  assert!(report.failed.contains_key(&target("//gen:broken")));
  assert_eq!(report.skipped[&target("//gen:after")], target("//gen:broken"));
  assert_eq!(report.built[&target("//gen:fine")].status, BuildStatus::Built);
  assert_eq!(project.read_file("out/__root__/gen/fine/ok.txt"), "ok\n");
}
