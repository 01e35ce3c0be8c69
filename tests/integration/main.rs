//! Integration tests for tokencache

mod cache_tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;
    use tokencache::codec::{self, CacheEntry, CacheState, EntryKind, FormatKind, FormatSet};
    use tokencache::store::{Blob, ByteStore, DataProtector, Principal, ProtectedFileStore};
    use tokencache::{CacheError, CacheHandle, CorruptPolicy, DiskState, MigrationPolicy};

    const SECRET: [u8; 32] = [7u8; 32];

    fn store_for(principal: &str) -> Arc<ProtectedFileStore> {
        let protector = DataProtector::from_secret(&SECRET, Principal::named(principal)).unwrap();
        Arc::new(ProtectedFileStore::new(protector))
    }

    fn open(folder: &Path, policy: MigrationPolicy) -> CacheHandle {
        CacheHandle::persistent(FormatSet::in_folder(folder), policy, store_for("uid:test"))
            .unwrap()
    }

    fn token(secret: &str) -> CacheEntry {
        CacheEntry::new(EntryKind::RefreshToken, secret)
            .with_client_id("client-a")
            .with_expires_on(4_000_000_000)
    }

    fn write_format(folder: &Path, kind: FormatKind, state: &CacheState) {
        let path = folder.join(kind.default_file_name());
        let bytes = codec::encode(kind, state).unwrap();
        store_for("uid:test")
            .write(&path, &Blob::Present(bytes))
            .unwrap();
    }

    #[test]
    fn entries_survive_restart() {
        let temp = TempDir::new().unwrap();
        let cache = open(temp.path(), MigrationPolicy::new(true));
        cache
            .access(|tokens| {
                tokens.insert("rt-1", token("refresh-secret"));
                Ok(())
            })
            .unwrap();

        for kind in FormatKind::all() {
            assert!(temp.path().join(kind.default_file_name()).is_file());
        }

        let restarted = open(temp.path(), MigrationPolicy::new(true));
        let entry = restarted.access(|tokens| Ok(tokens.get("rt-1"))).unwrap();
        assert_eq!(entry.unwrap().secret, "refresh-secret");
    }

    #[test]
    fn files_never_hold_plaintext() {
        let temp = TempDir::new().unwrap();
        let cache = open(temp.path(), MigrationPolicy::new(true));
        cache
            .access(|tokens| {
                tokens.insert("rt-1", token("very-distinctive-secret"));
                Ok(())
            })
            .unwrap();

        for kind in FormatKind::all() {
            let raw = std::fs::read(temp.path().join(kind.default_file_name())).unwrap();
            let needle = b"very-distinctive-secret";
            assert!(!raw.windows(needle.len()).any(|w| w == needle), "{}", kind);
        }
    }

    #[cfg(unix)]
    #[test]
    fn files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("cache");
        let cache = open(&folder, MigrationPolicy::new(true));
        cache
            .access(|tokens| {
                tokens.insert("rt-1", token("s"));
                Ok(())
            })
            .unwrap();

        let mode = std::fs::metadata(folder.join("unifiedCacheV2.bin"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(&folder).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn legacy_only_cache_is_migrated_on_write() {
        let temp = TempDir::new().unwrap();
        let mut legacy = CacheState::new();
        legacy.insert("legacy-rt", token("old"));
        write_format(temp.path(), FormatKind::Legacy, &legacy);

        let cache = open(temp.path(), MigrationPolicy::new(true));
        let (found, report) = cache
            .access_with_report(|tokens| {
                tokens.insert("new-rt", token("new"));
                Ok(tokens.get("legacy-rt"))
            })
            .unwrap();
        assert_eq!(found.unwrap().secret, "old");
        assert_eq!(report.disk_state, DiskState::OnlyLegacy);

        let v2 = open(temp.path(), MigrationPolicy::new(false));
        let (keys, report) = v2
            .access_with_report(|tokens| Ok(tokens.snapshot().keys().map(String::from).collect::<Vec<_>>()))
            .unwrap();
        assert_eq!(report.authoritative, Some(FormatKind::UnifiedV2));
        assert_eq!(keys, vec!["legacy-rt", "new-rt"]);
    }

    #[test]
    fn unified_v2_wins_over_legacy() {
        let temp = TempDir::new().unwrap();
        let mut legacy = CacheState::new();
        legacy.insert("shared", token("legacy-value"));
        let mut v2 = CacheState::new();
        v2.insert("shared", token("v2-value"));
        write_format(temp.path(), FormatKind::Legacy, &legacy);
        write_format(temp.path(), FormatKind::UnifiedV2, &v2);

        let cache = open(temp.path(), MigrationPolicy::new(true));
        let entry = cache.access(|tokens| Ok(tokens.get("shared"))).unwrap();
        assert_eq!(entry.unwrap().secret, "v2-value");
    }

    #[test]
    fn unparseable_v2_leaves_legacy_usable() {
        let temp = TempDir::new().unwrap();
        let mut legacy = CacheState::new();
        legacy.insert("rt", token("from-legacy"));
        write_format(temp.path(), FormatKind::Legacy, &legacy);
        store_for("uid:test")
            .write(
                &temp.path().join("unifiedCacheV2.bin"),
                &Blob::Present(br#"{"version": 9, "entries": {}}"#.to_vec()),
            )
            .unwrap();

        let cache = open(temp.path(), MigrationPolicy::new(true));
        let (entry, report) = cache
            .access_with_report(|tokens| Ok(tokens.get("rt")))
            .unwrap();
        assert_eq!(entry.unwrap().secret, "from-legacy");
        assert!(matches!(
            report.malformed.as_slice(),
            [CacheError::MalformedFormat {
                format: FormatKind::UnifiedV2,
                ..
            }]
        ));
    }

    #[test]
    fn undecryptable_file_fails_unless_discarded() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("unifiedCache.bin"), b"garbage, not sealed").unwrap();

        let strict = open(temp.path(), MigrationPolicy::new(true));
        let err = strict.access(|tokens| Ok(tokens.len())).unwrap_err();
        assert!(matches!(err, CacheError::CorruptCache { .. }));
        assert!(err.hint().is_some());

        let lenient = open(
            temp.path(),
            MigrationPolicy::new(true).with_corrupt_policy(CorruptPolicy::Discard),
        );
        lenient
            .access(|tokens| {
                tokens.insert("rt", token("fresh"));
                Ok(())
            })
            .unwrap();

        // The corrupt file was overwritten by the persist
        assert_eq!(strict.access(|tokens| Ok(tokens.len())).unwrap(), 1);
    }

    #[test]
    fn other_principal_cannot_read() {
        let temp = TempDir::new().unwrap();
        open(temp.path(), MigrationPolicy::new(true))
            .access(|tokens| {
                tokens.insert("rt", token("mine"));
                Ok(())
            })
            .unwrap();

        let intruder = CacheHandle::persistent(
            FormatSet::in_folder(temp.path()),
            MigrationPolicy::new(true),
            store_for("uid:other"),
        )
        .unwrap();
        let err = intruder.access(|tokens| Ok(tokens.len())).unwrap_err();
        assert!(matches!(err, CacheError::CorruptCache { .. }));
    }

    #[test]
    fn clear_deletes_files_and_tolerates_missing_ones() {
        let temp = TempDir::new().unwrap();
        let cache = open(temp.path(), MigrationPolicy::new(true));
        cache
            .access(|tokens| {
                tokens.insert("rt", token("s"));
                Ok(())
            })
            .unwrap();
        std::fs::remove_file(temp.path().join("unifiedCache.bin")).unwrap();

        let deleted = cache.clear().unwrap();
        assert_eq!(deleted, vec![FormatKind::Legacy, FormatKind::UnifiedV2]);
        for kind in FormatKind::all() {
            assert!(!temp.path().join(kind.default_file_name()).exists());
        }
        assert!(cache.access(|tokens| Ok(tokens.is_empty())).unwrap());
    }

    #[test]
    fn concurrent_access_keeps_every_entry() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(open(temp.path(), MigrationPolicy::new(true)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache
                        .access(|tokens| {
                            tokens.insert(format!("rt-{}", i), token("s"));
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reloaded = open(temp.path(), MigrationPolicy::new(false));
        assert_eq!(reloaded.access(|tokens| Ok(tokens.len())).unwrap(), 8);
    }

    /// File store whose writes can be made to fail
    struct FlakyStore {
        inner: Arc<ProtectedFileStore>,
        fail_writes: AtomicBool,
    }

    impl ByteStore for FlakyStore {
        fn read(&self, path: &Path) -> tokencache::CacheResult<Blob> {
            self.inner.read(path)
        }

        fn write(&self, path: &Path, blob: &Blob) -> tokencache::CacheResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(CacheError::io(
                    format!("writing {}", path.display()),
                    std::io::Error::other("disk full"),
                ));
            }
            self.inner.write(path, blob)
        }

        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }
    }

    #[test]
    fn removal_after_failed_write_is_not_undone_by_reload() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore {
            inner: store_for("uid:test"),
            fail_writes: AtomicBool::new(false),
        });
        let cache = CacheHandle::persistent(
            FormatSet::in_folder(temp.path()),
            MigrationPolicy::new(true),
            store.clone(),
        )
        .unwrap();
        cache
            .access(|tokens| {
                tokens.insert("signed-out", token("s"));
                tokens.insert("kept", token("k"));
                Ok(())
            })
            .unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = cache
            .access(|tokens| Ok(tokens.remove("signed-out")))
            .unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));

        store.fail_writes.store(false, Ordering::SeqCst);
        let present = cache
            .access(|tokens| Ok(tokens.contains_key("signed-out")))
            .unwrap();
        assert!(!present);

        let restarted = open(temp.path(), MigrationPolicy::new(true));
        let keys = restarted
            .access(|tokens| Ok(tokens.snapshot().keys().map(str::to_string).collect::<Vec<_>>()))
            .unwrap();
        assert_eq!(keys, vec!["kept".to_string()]);
    }

    #[test]
    fn removal_racing_a_reload_is_not_undone() {
        let temp = TempDir::new().unwrap();
        let cache = open(temp.path(), MigrationPolicy::new(true));
        cache
            .access(|tokens| {
                tokens.insert("signed-out", token("s"));
                Ok(())
            })
            .unwrap();

        let barrier = Barrier::new(2);
        thread::scope(|s| {
            s.spawn(|| {
                cache
                    .access(|tokens| {
                        tokens.remove("signed-out");
                        barrier.wait();
                        barrier.wait();
                        Ok(())
                    })
                    .unwrap();
            });
            s.spawn(|| {
                barrier.wait();
                let inserted = cache.access(|tokens| {
                    tokens.insert("added", token("a"));
                    Ok(tokens.contains_key("signed-out"))
                });
                barrier.wait();
                assert!(!inserted.unwrap());
            });
        });

        let restarted = open(temp.path(), MigrationPolicy::new(true));
        let (removed, added) = restarted
            .access(|tokens| Ok((tokens.contains_key("signed-out"), tokens.contains_key("added"))))
            .unwrap();
        assert!(!removed);
        assert!(added);
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokencache::codec::{self, CacheEntry, CacheState, EntryKind, FormatKind};
    use tokencache::store::{Blob, ByteStore, DataProtector, ProtectedFileStore};

    /// Isolated config, cache folder and state dir
    struct Sandbox {
        temp: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::write(
                temp.path().join("config.toml"),
                "[general]\naudit_log = false\n",
            )
            .unwrap();
            Self { temp }
        }

        fn cache_dir(&self) -> PathBuf {
            self.temp.path().join("cache")
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("tokencache");
            cmd.env("TOKENCACHE_CONFIG", self.temp.path().join("config.toml"))
                .env("TOKENCACHE_DIR", self.cache_dir())
                .env("XDG_STATE_HOME", self.temp.path().join("state"))
                .env_remove("TOKENCACHE_SECRET");
            cmd
        }

        fn add(&self, key: &str, secret: &str) {
            self.cmd()
                .args(["add", key, "--secret", secret, "--client-id", "app"])
                .assert()
                .success();
        }
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("tokencache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Encrypted credential cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("tokencache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("tokencache"));
    }

    #[test]
    fn list_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached entries"));
    }

    #[test]
    fn add_then_list_hides_secret() {
        let sandbox = Sandbox::new();
        sandbox.add("rt-1", "hunter2-secret");

        sandbox
            .cmd()
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"rt-1\""))
            .stdout(predicate::str::contains("RefreshToken"))
            .stdout(predicate::str::contains("hunter2-secret").not());

        sandbox
            .cmd()
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq("rt-1\n"));
    }

    #[test]
    fn add_twice_updates() {
        let sandbox = Sandbox::new();
        sandbox.add("rt-1", "a");
        sandbox
            .cmd()
            .args(["add", "rt-1", "--secret", "b"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Updated"));
    }

    #[test]
    fn remove_missing_entry_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["remove", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache entry not found"));
    }

    #[test]
    fn remove_existing_entry() {
        let sandbox = Sandbox::new();
        sandbox.add("rt-1", "s");
        sandbox
            .cmd()
            .args(["remove", "rt-1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed"));
        sandbox
            .cmd()
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn status_lists_files() {
        let sandbox = Sandbox::new();
        sandbox.add("rt-1", "s");
        sandbox
            .cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("cacheAdalV3.bin"))
            .stdout(predicate::str::contains("unifiedCacheV2.bin"))
            .stdout(predicate::str::contains("Entries: 1"));
    }

    #[test]
    fn migrate_rewrites_legacy_into_unified() {
        let sandbox = Sandbox::new();
        let cache_dir = sandbox.cache_dir();

        // Same key file and principal the CLI resolves for --cache-dir
        let protector = DataProtector::for_current_user(&cache_dir.join(".protect.key")).unwrap();
        let store = ProtectedFileStore::new(protector);
        let mut legacy = CacheState::new();
        legacy.insert("legacy-rt", CacheEntry::new(EntryKind::RefreshToken, "old"));
        store
            .write(
                &cache_dir.join("cacheAdalV3.bin"),
                &Blob::Present(codec::encode(FormatKind::Legacy, &legacy).unwrap()),
            )
            .unwrap();

        sandbox
            .cmd()
            .arg("migrate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Migrated 1 entries"));

        assert!(cache_dir.join("unifiedCache.bin").is_file());
        assert!(cache_dir.join("unifiedCacheV2.bin").is_file());
    }

    #[test]
    fn disabled_legacy_is_not_written() {
        let sandbox = Sandbox::new();
        std::fs::write(
            sandbox.temp.path().join("config.toml"),
            "[general]\naudit_log = false\n\n[formats.legacy]\nenabled = false\n",
        )
        .unwrap();
        sandbox.add("rt-1", "s");

        assert!(!sandbox.cache_dir().join("cacheAdalV3.bin").exists());
        assert!(sandbox.cache_dir().join("unifiedCacheV2.bin").is_file());
    }

    #[test]
    fn clear_requires_confirmation_when_not_a_terminal() {
        let sandbox = Sandbox::new();
        sandbox.add("rt-1", "s");
        sandbox
            .cmd()
            .arg("clear")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--yes"));
        assert!(sandbox.cache_dir().join("unifiedCacheV2.bin").is_file());
    }

    #[test]
    fn migrate_on_empty_folder_writes_nothing() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("migrate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to write"));

        for name in ["cacheAdalV3.bin", "unifiedCache.bin", "unifiedCacheV2.bin"] {
            assert!(!sandbox.cache_dir().join(name).exists());
        }
    }

    #[test]
    fn app_cache_is_kept_apart_from_user_cache() {
        let sandbox = Sandbox::new();
        sandbox.add("user-rt", "u");
        sandbox
            .cmd()
            .args(["--app", "add", "app-rt", "--secret", "a", "--kind", "access-token"])
            .assert()
            .success();

        assert!(sandbox.cache_dir().join("app/unifiedCacheV2.bin").is_file());
        sandbox
            .cmd()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("user-rt"))
            .stdout(predicate::str::contains("app-rt").not());
        sandbox
            .cmd()
            .args(["list", "--app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("app-rt"))
            .stdout(predicate::str::contains("user-rt").not());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn audit_log_records_library_migration() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.temp.path().join("config.toml"), "[general]\naudit_log = true\n")
            .unwrap();
        let cache_dir = sandbox.cache_dir();
        let protector = DataProtector::for_current_user(&cache_dir.join(".protect.key")).unwrap();
        let mut legacy = CacheState::new();
        legacy.insert(
            "legacy-rt",
            CacheEntry::new(EntryKind::RefreshToken, "distinctive-legacy-secret"),
        );
        ProtectedFileStore::new(protector)
            .write(
                &cache_dir.join("cacheAdalV3.bin"),
                &Blob::Present(codec::encode(FormatKind::Legacy, &legacy).unwrap()),
            )
            .unwrap();

        sandbox.cmd().args(["remove", "legacy-rt"]).assert().success();

        let log = std::fs::read_to_string(
            sandbox.temp.path().join("state/tokencache/audit.log"),
        )
        .unwrap();
        let events: Vec<serde_json::Value> =
            log.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(events[0]["event"], "migrated");
        assert_eq!(events[0]["from"][0], "legacy");
        assert_eq!(events[1]["event"], "entry_removed");
        assert_eq!(events[1]["key"], "legacy-rt");
        assert!(!log.contains("distinctive-legacy-secret"));
    }

    #[test]
    fn clear_yes_deletes_files() {
        let sandbox = Sandbox::new();
        sandbox.add("rt-1", "s");
        sandbox
            .cmd()
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted"));

        for name in ["cacheAdalV3.bin", "unifiedCache.bin", "unifiedCacheV2.bin"] {
            assert!(!sandbox.cache_dir().join(name).exists());
        }
    }

    #[test]
    fn corrupt_file_reports_hint() {
        let sandbox = Sandbox::new();
        std::fs::create_dir_all(sandbox.cache_dir()).unwrap();
        std::fs::write(sandbox.cache_dir().join("unifiedCacheV2.bin"), b"junk").unwrap();

        sandbox
            .cmd()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("corrupt"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.temp.path().join("config.toml"), "[cache\n").unwrap();
        sandbox
            .cmd()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("allow_legacy_fallback = true"));
    }

    #[test]
    fn config_init_writes_file() {
        let sandbox = Sandbox::new();
        let path = sandbox.temp.path().join("fresh").join("config.toml");
        cargo_bin_cmd!("tokencache")
            .env("TOKENCACHE_CONFIG", &path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(path.is_file());
    }
}
