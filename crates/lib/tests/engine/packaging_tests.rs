//! Capability consumers over resolved graphs.

use rulegraph_lib::SourcePath;
use rulegraph_lib::capability::LinkStyle;
use rulegraph_lib::packaging::{collect_android_packageables, runtime_closure, transitive_native_link_input};
use rulegraph_lib::traversal::filtered_closure;

use super::common::{resolve, target};

const NATIVE: &str = r#"[
  { "target": "//native:z", "kind": "prebuilt_cxx_library",
    "args": { "static_lib": "native/libz.a", "shared_lib": "native/libz.so", "exported_linker_flags": ["-lz"] } },
  { "target": "//native:png", "kind": "prebuilt_cxx_library", "deps": ["//native:z"],
    "args": { "static_lib": "native/libpng.a", "exported_linker_flags": ["-lpng"] } },
  { "target": "//native:headers", "kind": "prebuilt_cxx_library",
    "args": { "header_only": true, "include_dirs": ["native/include"] } },
  { "target": "//app:tool", "kind": "genrule", "deps": ["//native:png", "//native:headers"],
    "args": { "cmd": "true", "out": "tool" } }
]"#;

#[test]
fn native_link_input_by_style() {
  let graph = resolve(NATIVE);
  let seeds = [target("//app:tool")];

  let static_input = transitive_native_link_input(&graph, &seeds, LinkStyle::Static).unwrap();
  assert_eq!(
    static_input.inputs,
    vec![SourcePath::path("native/libpng.a"), SourcePath::path("native/libz.a")]
  );
  assert_eq!(static_input.args, vec!["-lpng", "-lz"]);

  let shared_input = transitive_native_link_input(&graph, &seeds, LinkStyle::Shared).unwrap();
  assert_eq!(
    shared_input.inputs,
    vec![SourcePath::path("native/libpng.a"), SourcePath::path("native/libz.so")]
  );

  // Asking twice gives the same answer.
  assert_eq!(
    transitive_native_link_input(&graph, &seeds, LinkStyle::Static).unwrap(),
    static_input
  );
}

#[test]
fn android_packageables_are_collected_per_owner() {
  let graph = resolve(
    r#"[
      { "target": "//third-party:guava", "kind": "prebuilt_jar", "args": { "binary_jar": "guava.jar" } },
      { "target": "//third-party:support", "kind": "android_prebuilt_aar",
        "deps": ["//third-party:guava"], "args": { "aar": "support.aar" } },
      { "target": "//apps:res", "kind": "genrule", "deps": ["//third-party:support"],
        "args": { "cmd": "true", "out": "res.zip" } }
    ]"#,
  );

  let collector = collect_android_packageables(&graph, [&target("//apps:res")]).unwrap();

  let support = target("//third-party:support");
  assert_eq!(
    collector.resource_dirs()[&support],
    vec![SourcePath::rule_output(target("//third-party:support#aar_unzip"), "res")]
  );
  assert_eq!(collector.manifests()[&support].len(), 1);

  let classpath: Vec<String> = collector.classpath_entries().keys().map(ToString::to_string).collect();
  assert_eq!(
    classpath,
    vec!["//third-party:guava", "//third-party:support#aar_prebuilt_jar"]
  );
}

#[test]
fn provided_deps_order_the_build_but_are_not_packaged_or_linked() {
  let graph = resolve(
    r#"[
      { "target": "//java:api", "kind": "prebuilt_jar", "args": { "binary_jar": "api.jar" } },
      { "target": "//java:impl", "kind": "prebuilt_jar", "provided_deps": ["//java:api"],
        "args": { "binary_jar": "impl.jar" } },
      { "target": "//native:sys", "kind": "prebuilt_cxx_library",
        "args": { "static_lib": "native/libsys.a", "exported_linker_flags": ["-lsys"] } },
      { "target": "//native:png", "kind": "prebuilt_cxx_library", "provided_deps": ["//native:sys"],
        "args": { "static_lib": "native/libpng.a", "exported_linker_flags": ["-lpng"] } },
      { "target": "//apps:res", "kind": "genrule", "deps": ["//java:impl", "//native:png"],
        "args": { "cmd": "true", "out": "res.zip" } }
    ]"#,
  );
  let seeds = [target("//apps:res")];

  let collector = collect_android_packageables(&graph, &seeds).unwrap();
  let classpath: Vec<String> = collector.classpath_entries().keys().map(ToString::to_string).collect();
  assert_eq!(classpath, vec!["//java:impl"]);

  let input = transitive_native_link_input(&graph, &seeds, LinkStyle::Static).unwrap();
  assert_eq!(input.inputs, vec![SourcePath::path("native/libpng.a")]);
  assert_eq!(input.args, vec!["-lpng"]);

  assert_eq!(graph.dependencies(&target("//java:impl")), vec![target("//java:api")]);
  assert_eq!(graph.dependencies(&target("//native:png")), vec![target("//native:sys")]);
}

#[test]
fn runtime_closure_includes_unpacked_aar() {
  let graph = resolve(
    r#"[
      { "target": "//third-party:support", "kind": "android_prebuilt_aar", "args": { "aar": "support.aar" } }
    ]"#,
  );
  let dag = runtime_closure(&graph, [&target("//third-party:support")]).unwrap();
  assert!(dag.contains(&target("//third-party:support#aar_unzip")));
  assert!(dag.contains(&target("//third-party:support#aar_prebuilt_jar")));
}

#[test]
fn filtered_closure_keeps_only_included_edges() {
  let graph = resolve(NATIVE);
  let dag = filtered_closure(
    &graph,
    [&target("//app:tool")],
    |rule| Ok::<_, std::convert::Infallible>(rule.cxx_preprocessor_dep().is_some()),
    |_| Ok(true),
  )
  .unwrap();

  let nodes: Vec<String> = dag.nodes().map(ToString::to_string).collect();
  assert_eq!(nodes, vec!["//native:headers", "//native:png", "//native:z"]);
  assert_eq!(dag.edges(), vec![(target("//native:png"), target("//native:z"))]);
}
