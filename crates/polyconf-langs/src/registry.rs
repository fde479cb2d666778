//! The language table.
//!
//! Each skip entry encodes a documented incompatibility: a capability the
//! type system lacks, an upstream toolchain bug, or a performance limit.
//! Reasons live next to the entry so skip-list growth stays auditable.

use std::path::Path;

use crate::{CommandSpec, DiffMode, LanguageDescriptor, OptionOverlay};

fn sample(path: &Path) -> String {
    path.display().to_string()
}

fn csharp_setup() -> CommandSpec {
    CommandSpec::new("dotnet").arg("restore")
}

fn csharp_compile() -> CommandSpec {
    CommandSpec::new("dotnet").args(["build", "-c", "Release", "-o", "out"])
}

fn csharp_run(path: &Path) -> CommandSpec {
    CommandSpec::new("dotnet")
        .args(["out/TopLevel.dll"])
        .arg(sample(path))
}

fn golang_compile() -> CommandSpec {
    CommandSpec::new("go").args(["build", "-o", "fixture_bin", "top_level.go"])
}

fn golang_run(path: &Path) -> CommandSpec {
    CommandSpec::new("./fixture_bin").arg(sample(path))
}

fn rust_compile() -> CommandSpec {
    CommandSpec::new("rustc").args(["-O", "--edition", "2021", "-o", "fixture_bin", "top_level.rs"])
}

fn rust_run(path: &Path) -> CommandSpec {
    CommandSpec::new("./fixture_bin").arg(sample(path))
}

fn python_run(path: &Path) -> CommandSpec {
    CommandSpec::new("python3").arg("top_level.py").arg(sample(path))
}

fn typescript_setup() -> CommandSpec {
    CommandSpec::new("npm").args(["install", "--no-audit", "--no-fund"])
}

fn typescript_compile() -> CommandSpec {
    CommandSpec::new("npx").args(["tsc", "--strict", "top_level.ts"])
}

fn typescript_run(path: &Path) -> CommandSpec {
    CommandSpec::new("node").arg("top_level.js").arg(sample(path))
}

fn swift_compile() -> CommandSpec {
    CommandSpec::new("swiftc").args(["-O", "-o", "fixture_bin", "top_level.swift"])
}

fn swift_run(path: &Path) -> CommandSpec {
    CommandSpec::new("./fixture_bin").arg(sample(path))
}

fn kotlin_compile() -> CommandSpec {
    CommandSpec::new("kotlinc").args(["top_level.kt", "-include-runtime", "-d", "fixture.jar"])
}

fn kotlin_run(path: &Path) -> CommandSpec {
    CommandSpec::new("java").args(["-jar", "fixture.jar"]).arg(sample(path))
}

fn elm_setup() -> CommandSpec {
    CommandSpec::new("elm").args(["install", "elm/json"]).env("ELM_HOME", ".elm")
}

fn elm_compile() -> CommandSpec {
    CommandSpec::new("elm")
        .args(["make", "TopLevel.elm", "--output", "elm.js"])
        .env("ELM_HOME", ".elm")
}

fn elm_run(path: &Path) -> CommandSpec {
    CommandSpec::new("node").arg("run-elm.js").arg(sample(path))
}

pub(crate) static REGISTRY: &[LanguageDescriptor] = &[
    LanguageDescriptor {
        name: "csharp",
        fixtures_root: "csharp",
        setup: Some(csharp_setup),
        compile: Some(csharp_compile),
        run_step: csharp_run,
        diff_mode: DiffMode::Direct,
        allow_missing_null: false,
        output_artifact: "TopLevel.cs",
        top_level_type: "TopLevel",
        skip_json: &[
            // Blows the 64KB string-literal limit in the generated test driver.
            "blns-object.json",
        ],
        skip_schema: &[],
        renderer_options: &[("array-type", "array"), ("density", "normal")],
        quick_test_options: &[
            OptionOverlay {
                label: "array-type=list",
                overrides: &[("array-type", "list")],
            },
            OptionOverlay {
                label: "density=dense",
                overrides: &[("density", "dense")],
            },
        ],
    },
    LanguageDescriptor {
        name: "golang",
        fixtures_root: "golang",
        setup: None,
        compile: Some(golang_compile),
        run_step: golang_run,
        diff_mode: DiffMode::ViaSchema,
        allow_missing_null: true,
        output_artifact: "top_level.go",
        top_level_type: "TopLevel",
        skip_json: &[
            // Identifier sanitization collides for near-duplicate keys.
            "identifiers.json",
            // Exceeds the gofmt pass's memory budget.
            "blns-object.json",
        ],
        skip_schema: &[
            // encoding/json cannot express the required discriminated union.
            "union-constraints.schema.json",
        ],
        renderer_options: &[],
        quick_test_options: &[OptionOverlay {
            label: "just-types",
            overrides: &[("just-types", "true")],
        }],
    },
    LanguageDescriptor {
        name: "rust",
        fixtures_root: "rust",
        setup: None,
        compile: Some(rust_compile),
        run_step: rust_run,
        diff_mode: DiffMode::Direct,
        allow_missing_null: false,
        output_artifact: "top_level.rs",
        top_level_type: "TopLevel",
        skip_json: &[],
        skip_schema: &[],
        renderer_options: &[("density", "normal"), ("visibility", "public")],
        quick_test_options: &[OptionOverlay {
            label: "visibility=crate",
            overrides: &[("visibility", "crate")],
        }],
    },
    LanguageDescriptor {
        name: "python",
        fixtures_root: "python",
        setup: None,
        compile: None,
        run_step: python_run,
        diff_mode: DiffMode::Direct,
        allow_missing_null: false,
        output_artifact: "top_level.py",
        top_level_type: "TopLevel",
        skip_json: &[
            // Recursion limit in the generated from_dict chain.
            "deep-nesting.json",
        ],
        skip_schema: &[],
        renderer_options: &[("python-version", "3.7")],
        quick_test_options: &[OptionOverlay {
            label: "python-version=3.5",
            overrides: &[("python-version", "3.5")],
        }],
    },
    LanguageDescriptor {
        name: "typescript",
        fixtures_root: "typescript",
        setup: Some(typescript_setup),
        compile: Some(typescript_compile),
        run_step: typescript_run,
        diff_mode: DiffMode::Direct,
        allow_missing_null: false,
        output_artifact: "top_level.ts",
        top_level_type: "TopLevel",
        skip_json: &[],
        skip_schema: &[],
        renderer_options: &[("converters", "top-level")],
        quick_test_options: &[OptionOverlay {
            label: "explicit-unions",
            overrides: &[("explicit-unions", "true")],
        }],
    },
    LanguageDescriptor {
        name: "swift",
        fixtures_root: "swift",
        setup: None,
        compile: Some(swift_compile),
        run_step: swift_run,
        diff_mode: DiffMode::Direct,
        allow_missing_null: true,
        output_artifact: "top_level.swift",
        top_level_type: "TopLevel",
        skip_json: &[
            // Codable cannot represent heterogeneous top-level arrays.
            "mixed-array.json",
        ],
        skip_schema: &[],
        renderer_options: &[("struct-or-class", "struct")],
        quick_test_options: &[OptionOverlay {
            label: "struct-or-class=class",
            overrides: &[("struct-or-class", "class")],
        }],
    },
    LanguageDescriptor {
        name: "kotlin",
        fixtures_root: "kotlin",
        setup: None,
        compile: Some(kotlin_compile),
        run_step: kotlin_run,
        diff_mode: DiffMode::ViaSchema,
        allow_missing_null: true,
        output_artifact: "top_level.kt",
        top_level_type: "TopLevel",
        skip_json: &[
            // kotlinc takes >5 min on this input (performance limit).
            "blns-object.json",
            "identifiers.json",
        ],
        skip_schema: &[],
        renderer_options: &[("framework", "kotlinx")],
        quick_test_options: &[],
    },
    LanguageDescriptor {
        name: "elm",
        fixtures_root: "elm",
        setup: Some(elm_setup),
        compile: Some(elm_compile),
        run_step: elm_run,
        diff_mode: DiffMode::ViaSchema,
        allow_missing_null: true,
        output_artifact: "TopLevel.elm",
        top_level_type: "TopLevel",
        skip_json: &[
            // Decoder pipeline overflows the stack on deeply recursive data.
            "deep-nesting.json",
            "identifiers.json",
        ],
        skip_schema: &[
            // elm/json has no representation for additionalProperties maps
            // mixed with fixed fields.
            "mixed-properties.schema.json",
        ],
        renderer_options: &[],
        quick_test_options: &[],
    },
];
