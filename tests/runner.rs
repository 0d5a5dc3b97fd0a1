use std::fs;
use std::path::Path;

use assert_matches::assert_matches;

use alphapickle::domain::SourceKind;
use alphapickle::error::AlphaPickleError;
use alphapickle::plot::PlotOptions;
use alphapickle::record::Artifact;
use alphapickle::runner::{RunOptions, Runner, SilentProgress};

// {'plddt': [90.0, 80.5], 'predicted_aligned_error': [[0.0, 1.5], [2.5, 0.0]]}
const WITH_PAE: &[u8] = b"\x80\x02}q\x00(X\x05\x00\x00\x00plddtq\x01]q\x02(G@V\x80\x00\x00\x00\x00\x00G@T \x00\x00\x00\x00\x00eX\x17\x00\x00\x00predicted_aligned_errorq\x03]q\x04(]q\x05(G\x00\x00\x00\x00\x00\x00\x00\x00G?\xf8\x00\x00\x00\x00\x00\x00e]q\x06(G@\x04\x00\x00\x00\x00\x00\x00G\x00\x00\x00\x00\x00\x00\x00\x00eeu.";
// {'plddt': [70.0]}
const PLDDT_ONLY: &[u8] = b"\x80\x02}q\x00X\x05\x00\x00\x00plddtq\x01]q\x02G@Q\x80\x00\x00\x00\x00\x00as.";
// {'ptm': 0.5}
const NO_PLDDT: &[u8] = b"\x80\x02}q\x00X\x03\x00\x00\x00ptmq\x01G?\xe0\x00\x00\x00\x00\x00\x00s.";
// plddt ndarray of shape (2**32, 2**32) backed by 8 bytes
const OVERSIZED: &[u8] = b"\x80\x02}q\x00X\x05\x00\x00\x00plddtq\x01cnumpy.core.multiarray\x0a_reconstruct\x0aq\x02cnumpy\x0andarray\x0aq\x03K\x00\x85q\x04c_codecs\x0aencode\x0aq\x05X\x01\x00\x00\x00bq\x06X\x06\x00\x00\x00latin1q\x07\x86q\x08Rq\x09\x87q\x0aRq\x0b(K\x01\x8a\x05\x00\x00\x00\x00\x01\x8a\x05\x00\x00\x00\x00\x01\x86q\x0ccnumpy\x0adtype\x0aq\x0dX\x02\x00\x00\x00f8q\x0e\x89\x88\x87q\x0fRq\x10(K\x03X\x01\x00\x00\x00<q\x11NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tq\x12b\x89h\x05X\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00q\x13h\x07\x86q\x14Rq\x15tq\x16bs.";

fn runner(jobs: usize) -> Runner {
    Runner::new(RunOptions {
        plot: PlotOptions {
            size_inches: 3.0,
            label_increment: 1,
        },
        jobs,
    })
    .unwrap()
}

fn write_batch(dir: &Path) {
    fs::write(
        dir.join("ranking_debug.json"),
        r#"{"order": ["model_3", "model_1", "model_2", "model_5"]}"#,
    )
    .unwrap();
    fs::write(dir.join("result_model_3.pkl"), WITH_PAE).unwrap();
    fs::write(dir.join("result_model_1.pkl"), NO_PLDDT).unwrap();
    fs::write(dir.join("result_model_2.pkl"), PLDDT_ONLY).unwrap();
    // result_model_5.pkl is missing on purpose
}

#[test]
fn batch_isolates_failures_and_keeps_rank_order() {
    for jobs in [1, 3] {
        let temp = tempfile::tempdir().unwrap();
        write_batch(temp.path());

        let result = runner(jobs).process_directory(temp.path(), &SilentProgress).unwrap();
        let ranks: Vec<u32> = result.ranks.iter().map(|rank| rank.entry.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 2);

        assert!(result.ranks[0].outcome.is_ok());
        assert_matches!(
            &result.ranks[1].outcome,
            Err(AlphaPickleError::MissingField { field, .. }) if field == "plddt"
        );
        assert_eq!(result.ranks[1].entry.model_id.as_str(), "model_1");
        assert!(result.ranks[2].outcome.is_ok());
        assert_matches!(&result.ranks[3].outcome, Err(AlphaPickleError::Filesystem(_)));

        for name in [
            "ranked_1_pLDDT.csv",
            "ranked_1_pLDDT.defattr",
            "ranked_1_pLDDT.svg",
            "ranked_1_PAE.csv",
            "ranked_1_PAE.svg",
            "ranked_3_pLDDT.csv",
        ] {
            assert!(temp.path().join(name).exists(), "{name} missing with jobs={jobs}");
        }
        assert!(!temp.path().join("ranked_3_PAE.csv").exists());
        assert!(!temp.path().join("ranked_2_pLDDT.csv").exists());

        assert_matches!(
            result.ensure_success(),
            Err(AlphaPickleError::BatchFailed { failed: 2, total: 4 })
        );
        let report = result.report();
        assert_eq!(report.ranks[1].error.as_deref().map(|e| e.contains("plddt")), Some(true));
    }
}

#[test]
fn corrupt_array_shape_fails_only_its_rank() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
        temp.path().join("ranking_debug.json"),
        r#"{"order": ["good", "bad"]}"#,
    )
    .unwrap();
    fs::write(temp.path().join("result_good.pkl"), PLDDT_ONLY).unwrap();
    fs::write(temp.path().join("result_bad.pkl"), OVERSIZED).unwrap();

    let result = runner(2).process_directory(temp.path(), &SilentProgress).unwrap();
    assert_eq!(result.ranks.len(), 2);
    assert!(result.ranks[0].outcome.is_ok());
    assert_matches!(&result.ranks[1].outcome, Err(AlphaPickleError::PickleDecode(_)));
    assert!(temp.path().join("ranked_1_pLDDT.csv").exists());
}

#[test]
fn batch_without_manifest_fails() {
    let temp = tempfile::tempdir().unwrap();
    assert_matches!(
        runner(1).process_directory(temp.path(), &SilentProgress),
        Err(AlphaPickleError::ManifestNotFound(_))
    );
}

#[test]
fn single_container_writes_all_artifacts() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("result_model_1.pkl");
    fs::write(&path, WITH_PAE).unwrap();

    let result = runner(1).process_container(&path, None, &SilentProgress).unwrap();
    assert_eq!(result.output_basename, "result_model_1");
    assert_eq!(result.residues, 2);
    let kinds: Vec<_> = result.artifacts.iter().map(|file| file.artifact).collect();
    assert_eq!(
        kinds,
        vec![
            Artifact::PlddtCsv,
            Artifact::PlddtAttributes,
            Artifact::PlddtPlot,
            Artifact::PaeCsv,
            Artifact::PaePlot,
        ]
    );
    let pae_csv = fs::read_to_string(temp.path().join("result_model_1_PAE.csv")).unwrap();
    assert_eq!(pae_csv, ",0,1\n0,0.0,1.5\n1,2.5,0.0\n");
}

#[test]
fn structure_files_produce_plddt_artifacts_only() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ranked_0.pdb");
    fs::write(
        &path,
        "ATOM      1  N   MET A   1       1.000   2.000   3.000  1.00 91.23           N\n",
    )
    .unwrap();

    let result = runner(1)
        .process_file(SourceKind::Pdb, &path, None, &SilentProgress)
        .unwrap();
    assert!(result.has_plddt);
    assert!(!result.has_pae);
    let csv = fs::read_to_string(temp.path().join("ranked_0_pLDDT.csv")).unwrap();
    assert_eq!(csv, "pLDDT\n91.23\n");
}

#[test]
fn single_file_errors_propagate() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("r.pkl");
    fs::write(&path, NO_PLDDT).unwrap();
    assert_matches!(
        runner(1).process_container(&path, Some(1), &SilentProgress),
        Err(AlphaPickleError::MissingField { .. })
    );
}
