use super::*;
use std::fs;
use std::path::PathBuf;

/// A fresh, unique directory under the system temp dir.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "segflake-{name}-{}-{:x}",
        std::process::id(),
        rand::random::<u64>()
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn creates_and_registers_missing_keys() {
    let registry = MachineRegistry::new(MemoryKeyDisk::new());
    let mut registered = Vec::new();

    let keys = registry
        .get_or_init_machine_keys(3, |machine_id, key| {
            registered.push((machine_id, key.to_owned()));
            Ok(())
        })
        .unwrap();

    assert_eq!(keys.len(), 3);
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(key.machine_id, i as u64);
        assert_eq!(key.key.len(), 32);
        assert!(key.key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(registered[i], (key.machine_id, key.key.clone()));
    }
    assert_eq!(registry.disk().load().unwrap().len(), 3);
}

#[test]
fn existing_keys_are_kept_and_not_reregistered() {
    let disk = MemoryKeyDisk::with_keys(vec!["a".into(), "b".into()]);
    let registry = MachineRegistry::new(&disk);
    let mut calls = Vec::new();

    let keys = registry
        .get_or_init_machine_keys(4, |machine_id, _| {
            calls.push(machine_id);
            Ok(())
        })
        .unwrap();

    assert_eq!(calls, [2, 3]);
    assert_eq!(keys[0].key, "a");
    assert_eq!(keys[1].key, "b");
    let stored = disk.load().unwrap();
    assert_eq!(stored[..2], ["a".to_owned(), "b".to_owned()]);
    assert_eq!(stored.len(), 4);
}

#[test]
fn smaller_count_returns_prefix_without_writing() {
    let disk = MemoryKeyDisk::with_keys(vec!["a".into(), "b".into(), "c".into()]);
    let registry = MachineRegistry::new(&disk);

    let keys = registry
        .get_or_init_machine_keys(2, |_, _| panic!("nothing to register"))
        .unwrap();
    assert_eq!(
        keys,
        [
            MachineKey {
                machine_id: 0,
                key: "a".into()
            },
            MachineKey {
                machine_id: 1,
                key: "b".into()
            },
        ]
    );
    assert_eq!(disk.load().unwrap().len(), 3);
}

#[test]
fn registration_failure_persists_nothing() {
    let disk = MemoryKeyDisk::with_keys(vec!["a".into()]);
    let registry = MachineRegistry::new(&disk);

    let err = registry
        .get_or_init_machine_keys(3, |machine_id, _| {
            if machine_id == 2 {
                Err("slot taken".into())
            } else {
                Ok(())
            }
        })
        .unwrap_err();

    assert!(matches!(err, Error::Registration { machine_id: 2, .. }));
    assert_eq!(disk.load().unwrap(), ["a".to_owned()]);
}

#[test]
fn json_file_survives_reopen() {
    let dir = scratch_dir("reopen");

    let first = MachineRegistry::open(&dir)
        .get_or_init_machine_keys(2, |_, _| Ok(()))
        .unwrap();
    assert!(dir.join(MACHINE_KEYS_FILE).exists());

    let second = MachineRegistry::open(&dir)
        .get_or_init_machine_keys(2, |_, _| panic!("keys already exist"))
        .unwrap();
    assert_eq!(first, second);

    let grown = MachineRegistry::open(&dir)
        .get_or_init_machine_keys(3, |_, _| Ok(()))
        .unwrap();
    assert_eq!(grown[..2], first[..]);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_file_reads_as_empty() {
    let dir = scratch_dir("missing");
    assert!(JsonKeyFile::in_dir(&dir).load().unwrap().is_empty());
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = scratch_dir("corrupt");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(MACHINE_KEYS_FILE), b"{not json").unwrap();

    let err = MachineRegistry::open(&dir)
        .get_or_init_machine_keys(1, |_, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, Error::Json(_)));
    assert_eq!(fs::read(dir.join(MACHINE_KEYS_FILE)).unwrap(), b"{not json");

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn key_file_needs_a_list_of_strings() {
    let dir = scratch_dir("shape");
    fs::create_dir_all(&dir).unwrap();
    let disk = JsonKeyFile::in_dir(&dir);

    fs::write(disk.path(), br#"{"keys": ["a", "b"]}"#).unwrap();
    assert_eq!(disk.load().unwrap(), ["a", "b"]);

    fs::write(disk.path(), br#"{"slots": ["a"]}"#).unwrap();
    assert!(matches!(disk.load(), Err(Error::Json(_))));

    fs::write(disk.path(), br#"{"keys": [1, 2]}"#).unwrap();
    assert!(matches!(disk.load(), Err(Error::Json(_))));

    fs::remove_dir_all(&dir).unwrap();
}
