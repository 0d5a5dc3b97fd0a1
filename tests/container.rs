use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;

use alphapickle::error::AlphaPickleError;
use alphapickle::loaders::{ContainerLoader, MetadataLoader};

// protocol 4: float32 plddt (3,), float32 PAE (3, 3) sharing one dtype, float64 scalars
const NUMPY_RECORD: &[u8] = b"\x80\x04\x95s\x01\x00\x00\x00\x00\x00\x00}\x94(\x8c\x05plddt\x94\x8c\x15numpy.core.multiarray\x94\x8c\x0c_reconstruct\x94\x93\x94\x8c\x05numpy\x94\x8c\x07ndarray\x94\x93\x94K\x00\x85\x94C\x01b\x94\x87\x94R\x94(K\x01K\x03\x85\x94h\x05\x8c\x05dtype\x94\x93\x94\x8c\x02f4\x94\x89\x88\x87\x94R\x94(K\x03\x8c\x01<\x94NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00t\x94b\x89C\x0c\x00\x00\xb7B\x00\x80\x90B\x00\x00@B\x94t\x94b\x8c\x17predicted_aligned_error\x94h\x04h\x07h\x08h\x09\x87\x94R\x94(K\x01K\x03K\x03\x86\x94h\x11\x89C$\x00\x00\x80>\x00\x00\x80?\x00\x00\x00@\x00\x00@@\x00\x00\x80>\x00\x00\x80@\x00\x00\xa0@\x00\x00\xc0@\x00\x00\x80>\x94t\x94b\x8c\x03ptm\x94h\x02\x8c\x06scalar\x94\x93\x94h\x0e\x8c\x02f8\x94\x89\x88\x87\x94R\x94(K\x03h\x12NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00t\x94bC\x08\x00\x00\x00\x00\x00\x00\xe8?\x94\x86\x94R\x94\x8c\x1bmax_predicted_aligned_error\x94h\x1eh!C\x08\x00\x00\x00\x00\x00\xc0?@\x94\x86\x94R\x94u.";

// protocol 4: {'plddt': [1.0]}
const LIST_RECORD: &[u8] = b"\x80\x04\x95\x18\x00\x00\x00\x00\x00\x00\x00}\x94\x8c\x05plddt\x94]\x94G?\xf0\x00\x00\x00\x00\x00\x00as.";

// protocol 3: PAE as a Fortran-ordered float64 (2, 2) array [[1, 2], [3, 4]]
const FORTRAN_RECORD: &[u8] = b"\x80\x03}q\x00(X\x05\x00\x00\x00plddtq\x01]q\x02(G?\xf0\x00\x00\x00\x00\x00\x00G@\x00\x00\x00\x00\x00\x00\x00eX\x17\x00\x00\x00predicted_aligned_errorq\x03cnumpy.core.multiarray\x0a_reconstruct\x0aq\x04cnumpy\x0andarray\x0aq\x05K\x00\x85q\x06C\x01bq\x07\x87q\x08Rq\x09(K\x01K\x02K\x02\x86q\x0acnumpy\x0adtype\x0aq\x0bX\x02\x00\x00\x00f8q\x0c\x89\x88\x87q\x0dRq\x0e(K\x03X\x01\x00\x00\x00<q\x0fNNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tq\x10b\x88C \x00\x00\x00\x00\x00\x00\xf0?\x00\x00\x00\x00\x00\x00\x08@\x00\x00\x00\x00\x00\x00\x00@\x00\x00\x00\x00\x00\x00\x10@q\x11tq\x12bu.";

// protocol 2: {'plddt': [12.5, 99.0]}
const PROTOCOL2_RECORD: &[u8] = b"\x80\x02}q\x00X\x05\x00\x00\x00plddtq\x01]q\x02(G@)\x00\x00\x00\x00\x00\x00G@X\xc0\x00\x00\x00\x00\x00es.";

// protocol 5: float64 plddt [91.5, 72.25], float32 PAE [[0.5, 2], [3, 0.5]] stored in Fortran order
const PROTOCOL5_RECORD: &[u8] = b"\x80\x05\x95\xf9\x00\x00\x00\x00\x00\x00\x00}\x94(\x8c\x05plddt\x94\x8c\x13numpy._core.numeric\x94\x8c\x0b_frombuffer\x94\x93\x94(\x96\x10\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\xe0V@\x00\x00\x00\x00\x00\x10R@\x94\x8c\x05numpy\x94\x8c\x05dtype\x94\x93\x94\x8c\x02f8\x94\x89\x88\x87\x94R\x94(K\x03\x8c\x01<\x94NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00t\x94bK\x02\x85\x94\x8c\x01C\x94t\x94R\x94\x8c\x17predicted_aligned_error\x94h\x04(\x96\x10\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00?\x00\x00@@\x00\x00\x00@\x00\x00\x00?\x94h\x08\x8c\x02f4\x94\x89\x88\x87\x94R\x94(K\x03h\x0cNNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00t\x94bK\x02K\x02\x86\x94\x8c\x01F\x94t\x94R\x94u.";

// protocol 2: plddt of shape (2**32, 2**32) backed by 8 bytes
const OVERSIZED_RECORD: &[u8] = b"\x80\x02}q\x00X\x05\x00\x00\x00plddtq\x01cnumpy.core.multiarray\x0a_reconstruct\x0aq\x02cnumpy\x0andarray\x0aq\x03K\x00\x85q\x04c_codecs\x0aencode\x0aq\x05X\x01\x00\x00\x00bq\x06X\x06\x00\x00\x00latin1q\x07\x86q\x08Rq\x09\x87q\x0aRq\x0b(K\x01\x8a\x05\x00\x00\x00\x00\x01\x8a\x05\x00\x00\x00\x00\x01\x86q\x0ccnumpy\x0adtype\x0aq\x0dX\x02\x00\x00\x00f8q\x0e\x89\x88\x87q\x0fRq\x10(K\x03X\x01\x00\x00\x00<q\x11NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tq\x12b\x89h\x05X\x08\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00q\x13h\x07\x86q\x14Rq\x15tq\x16bs.";

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn decodes_numpy_arrays() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "result_model_1_ptm.pkl", NUMPY_RECORD);

    let record = ContainerLoader.load(&path, None).unwrap();
    assert_eq!(record.residue_confidence(), Some(&[91.5, 72.25, 48.0][..]));
    let pae = record.pairwise_error().unwrap();
    assert_eq!(
        pae.to_rows(),
        vec![
            vec![0.25, 1.0, 2.0],
            vec![3.0, 0.25, 4.0],
            vec![5.0, 6.0, 0.25],
        ]
    );
    assert_eq!(record.output_basename(), "result_model_1_ptm");
}

#[test]
fn only_the_first_record_is_used() {
    let temp = tempfile::tempdir().unwrap();
    let mut bytes = NUMPY_RECORD.to_vec();
    bytes.extend_from_slice(LIST_RECORD);
    bytes.extend_from_slice(PROTOCOL2_RECORD);
    let path = write(temp.path(), "multi.pkl", &bytes);

    let record = ContainerLoader.load(&path, Some(2)).unwrap();
    assert_eq!(record.residue_count(), 3);
    assert_eq!(record.output_basename(), "ranked_2");

    let mut reversed = LIST_RECORD.to_vec();
    reversed.extend_from_slice(NUMPY_RECORD);
    let path = write(temp.path(), "reversed.pkl", &reversed);
    let record = ContainerLoader.load(&path, None).unwrap();
    assert_eq!(record.residue_confidence(), Some(&[1.0][..]));
    assert!(record.pairwise_error().is_none());
}

#[test]
fn fortran_ordered_arrays_are_transposed_into_rows() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "fortran.pkl", FORTRAN_RECORD);

    let record = ContainerLoader.load(&path, None).unwrap();
    let pae = record.pairwise_error().unwrap();
    assert_eq!(pae.to_rows(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
}

#[test]
fn protocol5_frombuffer_arrays() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "result_model_2.pkl", PROTOCOL5_RECORD);

    let record = ContainerLoader.load(&path, None).unwrap();
    assert_eq!(record.residue_confidence(), Some(&[91.5, 72.25][..]));
    let pae = record.pairwise_error().unwrap();
    assert_eq!(pae.to_rows(), vec![vec![0.5, 2.0], vec![3.0, 0.5]]);
}

#[test]
fn oversized_array_shape_is_a_decode_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "oversized.pkl", OVERSIZED_RECORD);
    assert_matches!(
        ContainerLoader.load(&path, None),
        Err(AlphaPickleError::PickleDecode(_))
    );
}

#[test]
fn gzip_containers_are_decompressed() {
    let temp = tempfile::tempdir().unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(PROTOCOL2_RECORD).unwrap();
    let path = write(temp.path(), "result_model_3.pkl.gz", &encoder.finish().unwrap());

    let record = ContainerLoader.load(&path, None).unwrap();
    assert_eq!(record.residue_confidence(), Some(&[12.5, 99.0][..]));
    assert_eq!(record.output_basename(), "result_model_3");
}

#[test]
fn garbage_is_a_decode_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "bad.pkl", b"\xff\xfe not a pickle");
    assert_matches!(
        ContainerLoader.load(&path, None),
        Err(AlphaPickleError::PickleDecode(_))
    );
}

#[test]
fn missing_file_is_a_filesystem_error() {
    let temp = tempfile::tempdir().unwrap();
    assert_matches!(
        ContainerLoader.load(&temp.path().join("absent.pkl"), None),
        Err(AlphaPickleError::Filesystem(_))
    );
}
