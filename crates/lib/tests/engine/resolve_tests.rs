//! Target graph resolution through the builtin descriptions.

use rulegraph_lib::capability::Capability;
use rulegraph_lib::description::DescriptionError;
use rulegraph_lib::resolve::{ResolveError, TargetGraphError};
use rulegraph_lib::{DescriptionRegistry, TargetGraph, resolve_target_graph, resolve_target_graph_parallel};

use super::common::{resolve, target};

const ANDROID_APP: &str = r#"[
  { "target": "//third-party:guava", "kind": "prebuilt_jar",
    "args": { "binary_jar": "third-party/guava-31.jar" } },
  { "target": "//third-party:support", "kind": "android_prebuilt_aar",
    "deps": ["//third-party:guava"], "args": { "aar": "third-party/support.aar" } },
  { "target": "//apps:base", "kind": "prebuilt_apk",
    "deps": ["//third-party:support"],
    "args": { "apk": "apps/base.apk", "manifest": "apps/AndroidManifest.xml", "package_name": "com.example.app" } },
  { "target": "//apps:signed", "kind": "apk_genrule",
    "args": { "apk": "//apps:base", "cmd": "cp $APK $OUT" } }
]"#;

#[test]
fn android_app_resolves_every_rule() {
  let graph = resolve(ANDROID_APP);

  let targets: Vec<String> = graph.targets().iter().map(ToString::to_string).collect();
  assert_eq!(
    targets,
    vec![
      "//apps:base",
      "//apps:signed",
      "//third-party:guava",
      "//third-party:support",
      "//third-party:support#aar_prebuilt_jar",
      "//third-party:support#aar_unzip",
    ]
  );

  let signed = graph.get(&target("//apps:signed")).unwrap();
  assert_eq!(signed.type_name(), "apk_genrule");
  assert_eq!(signed.capabilities(), vec![Capability::InstallableApk]);
  assert!(signed.build_deps().contains(&target("//apps:base")));

  let support = graph.get(&target("//third-party:support")).unwrap();
  assert!(support.supports(Capability::AndroidPackageable));
  assert!(support.supports(Capability::RuntimeDeps));
  assert!(support.native_linkable().is_none());
  assert!(support.exported_deps().contains(&target("//third-party:guava")));
}

#[test]
fn topological_order_puts_auxiliary_rules_first() {
  let graph = resolve(ANDROID_APP);
  let order = graph.topological_order();
  let position = |name: &str| order.iter().position(|t| t == &target(name)).unwrap();

  assert!(position("//third-party:support#aar_unzip") < position("//third-party:support#aar_prebuilt_jar"));
  assert!(position("//third-party:support#aar_prebuilt_jar") < position("//third-party:support"));
  assert!(position("//apps:base") < position("//apps:signed"));
}

#[tokio::test]
async fn parallel_resolution_builds_the_same_graph() {
  let graph = TargetGraph::from_json(ANDROID_APP).unwrap();
  let registry = DescriptionRegistry::with_builtins();

  let sequential = resolve_target_graph(&graph, &registry).unwrap();
  let parallel = resolve_target_graph_parallel(&graph, &registry, 3).await.unwrap();

  assert_eq!(sequential.targets(), parallel.targets());
  for t in sequential.targets() {
    assert_eq!(sequential.get(&t), parallel.get(&t), "rule {} differs", t);
  }
}

#[test]
fn apk_genrule_over_plain_genrule_is_rejected() {
  let graph = TargetGraph::from_json(
    r#"[
      { "target": "//gen:plain", "kind": "genrule", "args": { "cmd": "true", "out": "x" } },
      { "target": "//apps:signed", "kind": "apk_genrule", "args": { "apk": "//gen:plain", "cmd": "true" } }
    ]"#,
  )
  .unwrap();

  let err = resolve_target_graph(&graph, &DescriptionRegistry::with_builtins()).unwrap_err();
  assert_eq!(
    err,
    ResolveError::Description(DescriptionError::CapabilityMismatch {
      target: target("//apps:signed"),
      dependency: target("//gen:plain"),
      capability: Capability::InstallableApk,
    })
  );
}

#[test]
fn cyclic_target_graph_is_rejected() {
  let err = TargetGraph::from_json(
    r#"[
      { "target": "//a:one", "kind": "genrule", "deps": ["//a:two"], "args": { "cmd": "true", "out": "x" } },
      { "target": "//a:two", "kind": "genrule", "deps": ["//a:one"], "args": { "cmd": "true", "out": "x" } }
    ]"#,
  )
  .unwrap_err();
  assert!(matches!(err, TargetGraphError::Cycle(_)));
}

#[test]
fn custom_registry_rejects_unregistered_kinds() {
  let graph = TargetGraph::from_json(ANDROID_APP).unwrap();
  let err = resolve_target_graph(&graph, &DescriptionRegistry::empty()).unwrap_err();
  assert!(matches!(err, ResolveError::UnknownKind { .. }));
}

#[test]
fn flavored_target_nodes_resolve_and_link_by_exact_name() {
  let graph = resolve(
    r#"[
      { "target": "//java:lib#src", "kind": "prebuilt_jar", "args": { "binary_jar": "lib-src.jar" } },
      { "target": "//java:app", "kind": "genrule", "deps": ["//java:lib#src"],
        "args": { "cmd": "cp $SRCS $OUT", "out": "app.jar", "srcs": ["//java:lib#src"] } }
    ]"#,
  );

  assert!(graph.contains(&target("//java:lib#src")));
  assert!(!graph.contains(&target("//java:lib")));
  assert_eq!(graph.dependencies(&target("//java:app")), vec![target("//java:lib#src")]);
}
