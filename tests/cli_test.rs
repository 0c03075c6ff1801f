use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command; // Run programs
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const SAM: &str = "I am Sam. Sam I am. I do not like this Sam I am.\r\n";

// Write `dat` into the temporary directory and return the path.
fn put_file(temp_dir: &tempfile::TempDir,name: &str,dat: &[u8]) -> Result<PathBuf,Box<dyn std::error::Error>> {
    let path = temp_dir.path().join(name);
    std::fs::write(&path,dat)?;
    Ok(path)
}

fn round_trip_test(dat: &[u8]) -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = put_file(&temp_dir,"original.bin",dat)?;
    let cmp_path = temp_dir.path().join("original.huf");
    let out_path = temp_dir.path().join("expanded.bin");
    Command::cargo_bin("huffpack")?
        .arg("compress")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&cmp_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("compressed"));
    Command::cargo_bin("huffpack")?
        .arg("expand")
        .arg("-i").arg(&cmp_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("expanded"));
    match (std::fs::read(in_path),std::fs::read(out_path)) {
        (Ok(v1),Ok(v2)) => {
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare output with reference")
    }
    Ok(())
}

#[test]
fn compression() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = put_file(&temp_dir,"ab.txt","AB".as_bytes())?;
    let out_path = temp_dir.path().join("ab.huf");
    Command::cargo_bin("huffpack")?
        .arg("compress")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("compressed 2 into 9"));
    assert_eq!(std::fs::read(out_path)?,hex::decode("FA CE 82 01 60 09 06 42 B0".replace(" ",""))?);
    Ok(())
}

#[test]
fn round_trips() -> STDRESULT {
    round_trip_test(SAM.as_bytes())?;
    round_trip_test(&[])?;
    round_trip_test(&[65;100])?;
    let all: Vec<u8> = (0..=255).collect();
    round_trip_test(&all)
}

#[test]
fn bad_magic() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = put_file(&temp_dir,"bad.huf",SAM.as_bytes())?;
    let out_path = temp_dir.path().join("bad.txt");
    Command::cargo_bin("huffpack")?
        .arg("expand")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidMagicNumber"));
    Ok(())
}

#[test]
fn truncated() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let compressed = huffpack::tree_huff::compress_slice(SAM.as_bytes())?;
    let in_path = put_file(&temp_dir,"short.huf",&compressed[0..compressed.len()-3])?;
    let out_path = temp_dir.path().join("short.txt");
    Command::cargo_bin("huffpack")?
        .arg("expand")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("TruncatedStream"));
    Ok(())
}

#[test]
fn failure_leaves_no_stale_output() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = put_file(&temp_dir,"bad.huf",SAM.as_bytes())?;
    let out_path = put_file(&temp_dir,"stale.txt",&[b'x';1000])?;
    assert_cmd::Command::cargo_bin("huffpack")?
        .arg("expand")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .write_stdin("y\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidMagicNumber"));
    assert_eq!(std::fs::read(out_path)?.len(),0);
    Ok(())
}
