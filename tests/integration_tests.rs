//! Integration tests for subtyper
//!
//! These drive the compiled binary against fake stage tools written as short
//! shell scripts, so the whole run (staging, three stages, aggregation,
//! reorganization, archive and history) is exercised end to end.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const QUERY_FASTA: &str = ">Q1 sample from clinic\nACGTACGTAC\nGTACGT\n";

const DISTANCE_OK: &str = r#"printf '%s' "$1" > output/distance_args.txt
cat > output/p_distance_output.json <<'EOF'
{"closest_reference": "Ref_A", "p_distance": 0.0734, "below_cutoff": true}
EOF
"#;

const TREE_OK: &str = r#"touch tree_ran
printf '(Ref_A,Q1);\n' > "$5.treefile"
printf 'iqtree log\n' > "$5.log"
cp "$2" "$4"
cat > output/ml_tree_output.json <<'EOF'
{"log_likelihood": -1234.5}
EOF
"#;

const SUBTYPE_OK: &str = r#"printf '%s' "$2" > output/subtype_label.txt
cat > output/subtype_output.json <<'EOF'
{"closest_reference_ml": "Ref_A", "ml_distance": 0.0121,
 "conflicts": false, "subtype_assignment": "Clade II"}
EOF
"#;

const SUBTYPE_CONFLICT: &str = r#"cat > output/subtype_output.json <<'EOF'
{
  "closest_reference_ml": "Ref_B",
  "ml_distance": 0.2,
  "conflicts": true,
  "conflict_summary": {
    "conflicting_taxa": [
      {"taxon": "Ref_B", "clade": "I", "subtype": "Ia"},
      {"taxon": "Ref_C", "clade": "II", "subtype": "IIb"}
    ],
    "clades": ["I", "II"],
    "subtypes": ["Ia", "IIb"]
  },
  "subtype_assignment": "Not determined"
}
EOF
"#;

/// Helper to create a subtyper Command isolated from the caller's environment
fn subtyper(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("subtyper");
    cmd.current_dir(dir)
        .env_remove("SUBTYPER_PYTHON")
        .env_remove("SUBTYPER_REFERENCE_DIR")
        .env_remove("SUBTYPER_WORKSPACE_DIR")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", dir.join(".xdg"));
    cmd
}

/// A workspace with a reference set, fake tool scripts and a subtyper.toml.
fn create_workspace(distance: &str, tree: &str, subtype: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let reference = root.join("reference");
    fs::create_dir_all(&reference).unwrap();
    fs::write(reference.join("reference_genomes.fa"), ">Ref_A\nACGT\n").unwrap();
    fs::write(reference.join("reference_alignment.fa"), ">Ref_A\nACGT\n").unwrap();
    fs::write(reference.join("reference_tree.tree"), "(Ref_A);\n").unwrap();
    fs::write(reference.join("reference_subtypes.csv"), "taxon,clade,subtype\n").unwrap();

    let scripts = root.join("scripts");
    fs::create_dir_all(&scripts).unwrap();
    fs::write(scripts.join("p-distance-calc.py"), distance).unwrap();
    fs::write(scripts.join("infer_new_ML_tree.py"), tree).unwrap();
    fs::write(scripts.join("ML_patristic-dist_calc.py"), subtype).unwrap();

    fs::write(
        root.join("subtyper.toml"),
        "[reference]\ndir = \"reference\"\n\n[tools]\npython = \"sh\"\ndir = \"scripts\"\n",
    )
    .unwrap();
    fs::write(root.join("query.fasta"), QUERY_FASTA).unwrap();

    dir
}

fn archive_members(path: &Path) -> Vec<String> {
    let file = fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(str::to_string).collect()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        cargo_bin_cmd!("subtyper")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("history"));
    }

    #[test]
    fn test_version() {
        cargo_bin_cmd!("subtyper").arg("--version").assert().success();
    }

    #[test]
    fn test_run_requires_input() {
        cargo_bin_cmd!("subtyper").arg("run").assert().code(2);
    }

    #[test]
    fn test_missing_explicit_config_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        subtyper(dir.path())
            .args(["--config", "nope.toml", "history"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("nope.toml"));
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_successful_run_reports_assignment() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Query ID: Q1"))
            .stdout(predicate::str::contains("Query Length: 16"))
            .stdout(predicate::str::contains("Closest Reference: Ref_A (0.0734)"))
            .stdout(predicate::str::contains("Closest Reference: Ref_A (0.0121)"))
            .stdout(predicate::str::contains("Subtype Assignment: Clade II"))
            .stdout(predicate::str::contains("Conflict Summary").not());
    }

    #[test]
    fn test_successful_run_reorganizes_and_archives() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);
        let root = dir.path();

        subtyper(root)
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Archive:"));

        let iqtree = root.join("output").join("iqtree");
        assert!(iqtree.join("Q1_reoptimised.treefile").is_file());
        assert!(iqtree.join("Q1_reoptimised.log").is_file());
        assert!(iqtree.join("Q1_updated.fasta").is_file());
        assert!(!root.join("output").join("Q1_reoptimised.treefile").exists());
        assert!(root.join("output").join("p_distance_output.json").is_file());

        let members = archive_members(&root.join("output.zip"));
        assert!(members.contains(&"output/iqtree/Q1_reoptimised.treefile".to_string()));
        assert!(members.contains(&"output/subtype_output.json".to_string()));
    }

    #[test]
    fn test_subtype_stage_receives_query_id_as_taxon() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .success();

        let label = fs::read_to_string(dir.path().join("output/subtype_label.txt")).unwrap();
        assert_eq!(label, "Q1");
    }

    #[test]
    fn test_upload_from_stdin() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["run", "-", "--ui", "minimal", "--no-archive"])
            .write_stdin(QUERY_FASTA)
            .assert()
            .success()
            .stdout(predicate::str::contains("Subtype Assignment: Clade II"));

        // The tool saw the staged copy, which is gone after the run.
        let staged = fs::read_to_string(dir.path().join("output/distance_args.txt")).unwrap();
        assert!(staged.ends_with(".fasta"));
        assert!(!Path::new(&staged).exists());
    }

    #[test]
    fn test_no_archive_skips_packaging() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["run", "query.fasta", "--ui", "minimal", "--no-archive"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Archive:").not());

        assert!(!dir.path().join("output.zip").exists());
        assert!(dir.path().join("output/iqtree/Q1_reoptimised.treefile").is_file());
    }

    #[test]
    fn test_json_output() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        let output = subtyper(dir.path())
            .args(["run", "query.fasta", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["report"]["request"]["query_id"], "Q1");
        assert_eq!(value["report"]["subtype"]["subtype_assignment"], "Clade II");
    }

    #[test]
    fn test_irresolvable_conflict() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_CONFLICT);

        subtyper(dir.path())
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Consensus Assignment: Not determined due to conflicts.",
            ))
            .stdout(predicate::str::contains(
                "Conflicting Taxa: Ref_B (Clade I Subtype Ia), Ref_C (Clade II Subtype IIb)",
            ))
            .stdout(predicate::str::contains("Conflicting Clades: I, II"))
            .stdout(predicate::str::contains("Subtype Assignment: Not determined"));
    }

    #[test]
    fn test_distance_failure_stops_the_run() {
        let dir = create_workspace(
            "echo 'reference panel unreadable' >&2\nexit 3\n",
            TREE_OK,
            SUBTYPE_OK,
        );
        let root = dir.path();

        subtyper(root)
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Subtype Assignment").not())
            .stderr(predicate::str::contains("Analysis failed at stage Distance"))
            .stderr(predicate::str::contains("reference panel unreadable"));

        assert!(!root.join("tree_ran").exists());
        assert!(!root.join("output.zip").exists());
    }

    #[test]
    fn test_missing_treefile_fails_tree_stage() {
        let dir = create_workspace(
            DISTANCE_OK,
            "echo '{}' > output/ml_tree_output.json\n",
            SUBTYPE_OK,
        );

        subtyper(dir.path())
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Analysis failed at stage TreeInfer"))
            .stderr(predicate::str::contains("Q1_reoptimised.treefile"));

        assert!(!dir.path().join("output/subtype_output.json").exists());
    }

    #[test]
    fn test_stage_exiting_zero_without_artifact_fails() {
        let dir = create_workspace("true\n", TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Analysis failed at stage Distance"));
    }

    #[test]
    fn test_empty_upload_is_rejected_before_any_stage() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);
        fs::write(dir.path().join("empty.fasta"), "").unwrap();

        subtyper(dir.path())
            .args(["run", "empty.fasta", "--ui", "minimal"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid upload"));

        assert!(!dir.path().join("output/distance_args.txt").exists());
    }

    #[test]
    fn test_json_failure_output() {
        let dir = create_workspace("echo boom >&2\nexit 1\n", TREE_OK, SUBTYPE_OK);

        let output = subtyper(dir.path())
            .args(["run", "query.fasta", "--json"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["stage"], "Distance");
        assert_eq!(value["kind"], "process_failure");
        assert_eq!(value["diagnostics"], "boom\n");
    }
}

// =============================================================================
// History Tests
// =============================================================================

mod history {
    use super::*;

    #[test]
    fn test_history_empty() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .arg("history")
            .assert()
            .success()
            .stdout(predicate::str::contains("No runs recorded"));
    }

    #[test]
    fn test_history_lists_success_and_failure() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);
        let root = dir.path();

        subtyper(root)
            .args(["run", "query.fasta", "--ui", "minimal", "--no-archive"])
            .assert()
            .success();

        fs::write(root.join("scripts/p-distance-calc.py"), "exit 4\n").unwrap();
        subtyper(root)
            .args(["run", "query.fasta", "--ui", "minimal"])
            .assert()
            .code(1);

        subtyper(root)
            .arg("history")
            .assert()
            .success()
            .stdout(predicate::str::contains("Clade II"))
            .stdout(predicate::str::contains("failed at Distance (process_failure)"));

        let runs = fs::read_dir(root.join(".subtyper/runs")).unwrap().count();
        assert_eq!(runs, 2);
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();

        subtyper(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));

        let content = fs::read_to_string(dir.path().join("subtyper.toml")).unwrap();
        assert!(content.contains("[reference]"));
        assert!(content.contains("reference_genomes.fa"));
    }

    #[test]
    fn test_config_init_refuses_to_overwrite() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join("subtyper.toml")).unwrap();
        assert!(content.contains("python = \"sh\""));
    }

    #[test]
    fn test_config_validate_complete_workspace() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_missing_reference() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);
        fs::remove_file(dir.path().join("reference/reference_tree.tree")).unwrap();

        subtyper(dir.path())
            .args(["config", "validate"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("reference tree not found"));
    }

    #[test]
    fn test_config_show() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Subtyper Configuration"))
            .stdout(predicate::str::contains("python = \"sh\""))
            .stdout(predicate::str::contains("reference_genomes.fa"));
    }

    #[test]
    fn test_env_override_of_reference_dir() {
        let dir = create_workspace(DISTANCE_OK, TREE_OK, SUBTYPE_OK);

        subtyper(dir.path())
            .env("SUBTYPER_REFERENCE_DIR", "elsewhere")
            .args(["config", "validate"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("reference panel not found"))
            .stdout(predicate::str::contains("elsewhere"));
    }
}
