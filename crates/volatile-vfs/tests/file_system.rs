//! Registration API and namespace behaviour without a database engine.

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;

use volatile_vfs::{
    LockMode, OpenFlags, ReadOutcome, VfsError, register_volatile_file_system,
    unregister_volatile_file_system,
};

#[test]
fn test_end_to_end_file_lifecycle() {
    common::init_tracing();
    let fs = register_volatile_file_system("v1").unwrap();

    fs.create_file("a", "hello").unwrap();
    assert_eq!(fs.read_file("a").unwrap(), b"hello");

    let ns = fs.namespace();
    let fd = ns.open(Some("a"), OpenFlags::existing()).unwrap();
    let file = ns.file_by_fd(fd).unwrap();

    file.write(5, b"!").unwrap();
    assert_eq!(fs.read_file("a").unwrap(), b"hello!");

    file.truncate(3).unwrap();
    assert_eq!(fs.read_file("a").unwrap(), b"hel");
    assert_eq!(fs.file_size("a").unwrap(), 3);

    let dir = tempfile::tempdir().unwrap();
    fs.dump(dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"hel");

    // Open descriptor keeps the file alive.
    assert!(matches!(fs.remove("a"), Err(VfsError::Busy(_))));
    ns.close(fd).unwrap();
    fs.remove("a").unwrap();
    assert!(fs.file_names().is_empty());

    unregister_volatile_file_system(fs);
}

#[test]
fn test_descriptors_share_one_store() {
    let fs = register_volatile_file_system("fs-shared-store").unwrap();
    let ns = fs.namespace();

    let a = ns.open(Some("db"), OpenFlags::create()).unwrap();
    let b = ns.open(Some("db"), OpenFlags::existing()).unwrap();
    let fa = ns.file_by_fd(a).unwrap();
    let fb = ns.file_by_fd(b).unwrap();
    assert!(Arc::ptr_eq(&fa, &fb));

    fa.lock(LockMode::Shared);
    fb.lock(LockMode::Shared);
    fb.lock(LockMode::Reserved);
    assert_eq!(fa.lock_count(LockMode::Shared), 2);
    assert!(fa.check_reserved_lock());

    fb.unlock(LockMode::Reserved);
    assert!(!fa.check_reserved_lock());

    let mut buf = [0xFF; 4];
    fa.write(0, b"ab").unwrap();
    assert_eq!(fb.read(0, &mut buf), ReadOutcome::Short(2));
    assert_eq!(&buf, b"ab\0\0");

    ns.close(a).unwrap();
    ns.close(b).unwrap();
    fs.unregister();
}

#[test]
fn test_shm_released_after_every_descriptor_unmaps() {
    let fs = register_volatile_file_system("fs-shm").unwrap();
    let ns = fs.namespace();

    let a = ns.open(Some("db"), OpenFlags::create()).unwrap();
    let b = ns.open(Some("db"), OpenFlags::existing()).unwrap();
    let fa = ns.file_by_fd(a).unwrap();
    let fb = ns.file_by_fd(b).unwrap();

    let pa = fa.shm_map(0, 4096, true).unwrap().unwrap();
    let pb = fb.shm_map(0, 4096, false).unwrap().unwrap();
    assert_eq!(pa, pb);
    assert_eq!(fa.shm_refcount(), 2);

    fa.shm_unmap(false);
    assert_eq!(fb.shm_regions(), 1);
    fb.shm_unmap(true);
    assert_eq!(fa.shm_regions(), 0);

    ns.close(a).unwrap();
    ns.close(b).unwrap();
    fs.unregister();
}

#[test]
fn test_concurrent_writers_on_distinct_files() {
    let fs = register_volatile_file_system("fs-concurrent").unwrap();

    thread::scope(|s| {
        for t in 0..8u8 {
            let ns = fs.namespace();
            s.spawn(move || {
                let name = format!("file-{t}");
                let fd = ns.open(Some(&name), OpenFlags::create()).unwrap();
                let file = ns.file_by_fd(fd).unwrap();
                for i in 0..64u64 {
                    file.write(i, &[t]).unwrap();
                }
                ns.close(fd).unwrap();
            });
        }
    });

    assert_eq!(fs.file_names().len(), 8);
    for t in 0..8u8 {
        assert_eq!(fs.read_file(&format!("file-{t}")).unwrap(), vec![t; 64]);
    }
    fs.unregister();
}

#[test]
fn test_concurrent_writers_on_one_file() {
    let fs = register_volatile_file_system("fs-concurrent-one").unwrap();
    fs.create_file("shared", Vec::new()).unwrap();

    thread::scope(|s| {
        for t in 0..4u64 {
            let ns = fs.namespace();
            s.spawn(move || {
                let fd = ns.open(Some("shared"), OpenFlags::existing()).unwrap();
                let file = ns.file_by_fd(fd).unwrap();
                file.write(t * 16, &[t as u8 + 1; 16]).unwrap();
                ns.close(fd).unwrap();
            });
        }
    });

    let data = fs.read_file("shared").unwrap();
    assert_eq!(data.len(), 64);
    for t in 0..4usize {
        assert!(data[t * 16..(t + 1) * 16].iter().all(|b| *b == t as u8 + 1));
    }
    fs.unregister();
}

#[test]
fn test_dump_rejects_absolute_name() {
    let fs = register_volatile_file_system("fs-dump-absolute").unwrap();
    fs.create_file("/abs", "x").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let err = fs.dump(dir.path()).unwrap_err();
    assert!(err.to_string().contains("can't dump absolute file path /abs"));
    fs.unregister();
}
