//! End-to-end reconciliation scenarios over real temp directories and an
//! on-disk state database.

#![cfg(unix)]

mod common;

use std::path::Path;

use common::{ConfigBuilder, EntryBuilder, TestHarness};
use dotweave::db::render_repo;
use dotweave::merge::{CONFLICT_END, CONFLICT_START};
use dotweave::reconcile::{
    reconcile_config, CancelToken, FileOutcome, ProgressEvent, ProgressReporter, ReconcileOptions,
    Reconciler,
};
use dotweave::state::{MemoryRenderStore, RenderStore};
use dotweave::storage::{is_symlink, symlink_points_to};
use dotweave::template::{backup_path, conflict_path, rendered_path};

fn normal() -> ReconcileOptions {
    ReconcileOptions::default()
}

fn modified(path: &Path) -> std::time::SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

#[test]
fn test_host_template_renders_links_and_is_idempotent() {
    let h = TestHarness::new();
    let template = h.write_backup("app/hosts.tmpl", "Host={{ .Hostname }}");
    let entry = h.folder_entry("app");

    let first = h.run(&entry, normal());
    assert_eq!(first.outcome_for(&template), Some(FileOutcome::Rendered), "{}", first);

    let rendered = rendered_path(&template);
    assert_eq!(h.read(&rendered), "Host=myhost");
    let link = h.target("app/hosts");
    assert!(symlink_points_to(&link, &rendered));
    assert_eq!(h.read(&link), "Host=myhost");

    let mtime = modified(&rendered);
    let second = h.run(&entry, normal());
    assert_eq!(second.outcome_for(&template), Some(FileOutcome::Unchanged));
    assert_eq!(second.rendered + second.merged, 0);
    assert_eq!(modified(&rendered), mtime);
    assert!(symlink_points_to(&link, &rendered));
}

#[test]
fn test_second_run_does_not_touch_store() {
    let h = TestHarness::new();
    h.write_backup("app/a.tmpl", "os={{ .OS }}");
    let entry = h.folder_entry("app");

    let store = MemoryRenderStore::new();
    let reconciler = Reconciler::new(h.platform().clone(), &store, &h.backup_root);
    reconciler.reconcile_entry(&entry);
    assert_eq!(store.save_count(), 1);

    let summary = reconciler.reconcile_entry(&entry);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(store.save_count(), 1);
}

#[test]
fn test_orphaned_artifact_is_backed_up() {
    let h = TestHarness::new();
    let template = h.write_backup("app/hosts.tmpl", "Host={{ .Hostname }}");
    let rendered = h.write_backup("app/hosts.tmpl.rendered", "unrelated content\n");

    let summary = h.run(&h.folder_entry("app"), normal());
    assert_eq!(summary.rendered, 1);

    assert_eq!(h.read(&backup_path(&rendered)), "unrelated content\n");
    assert_eq!(h.read(&rendered_path(&template)), "Host=myhost");
}

#[test]
fn test_adopts_existing_target_file() {
    let h = TestHarness::new();
    std::fs::create_dir_all(h.backup("zsh")).unwrap();
    let target = h.write_target(".zshrc", "export EDITOR=nvim\n");

    let summary = h.run(&h.file_entry("zsh", &[".zshrc"]), normal());
    assert_eq!(summary.adopted, 1, "{}", summary);

    let source = h.backup("zsh/.zshrc");
    assert_eq!(h.read(&source), "export EDITOR=nvim\n");
    assert!(symlink_points_to(&target, &source));
    assert_eq!(h.read(&target), "export EDITOR=nvim\n");
}

#[test]
fn test_adopts_existing_target_folder() {
    let h = TestHarness::new();
    h.write_target("nvim/init.lua", "-- mine");

    let summary = h.run(&h.folder_entry("nvim"), normal());
    assert_eq!(summary.adopted, 1, "{}", summary);

    assert_eq!(h.read(&h.backup("nvim/init.lua")), "-- mine");
    assert!(is_symlink(&h.target("nvim")));
    assert_eq!(h.read(&h.target("nvim/init.lua")), "-- mine");
}

#[test]
fn test_missing_source_and_target_is_skipped() {
    let h = TestHarness::new();
    std::fs::create_dir_all(h.backup("zsh")).unwrap();

    let summary = h.run(&h.file_entry("zsh", &[".zlogin"]), normal());
    assert_eq!(summary.skipped, 1);
    assert!(!summary.has_failures());
    assert!(!h.target(".zlogin").exists());
}

#[test]
fn test_wrong_symlink_is_replaced() {
    let h = TestHarness::new();
    let source = h.write_backup("zsh/.zprofile", "path+=~/bin\n");
    let elsewhere = h.write_target("old/.zprofile", "stale\n");
    let target = h.target(".zprofile");
    std::os::unix::fs::symlink(&elsewhere, &target).unwrap();

    let summary = h.run(&h.file_entry("zsh", &[".zprofile"]), normal());
    assert_eq!(summary.linked, 1);
    assert!(symlink_points_to(&target, &source));
    assert_eq!(h.read(&elsewhere), "stale\n");
}

#[test]
fn test_file_list_mode_renders_templates() {
    let h = TestHarness::new();
    let template = h.write_backup("git/.gitconfig.tmpl", "[user]\n  name = {{ .User }}\n");
    h.write_backup("git/.gitignore", "*.swp\n");

    let summary = h.run(
        &h.file_entry("git", &[".gitconfig.tmpl", ".gitignore"]),
        normal(),
    );
    assert_eq!(summary.rendered, 1, "{}", summary);
    assert_eq!(summary.linked, 1);

    let link = h.target(".gitconfig");
    assert!(symlink_points_to(&link, &rendered_path(&template)));
    assert_eq!(h.read(&link), "[user]\n  name = tester\n");
}

#[test]
fn test_merge_cycles_preserve_user_edits() {
    let h = TestHarness::new();
    let template = h.write_backup("app/conf.tmpl", "name=a\ncolor=red\nsize=1");
    let rendered = rendered_path(&template);
    let entry = h.folder_entry("app");

    h.run(&entry, normal());
    std::fs::write(&rendered, "name=a\ncolor=blue\nsize=1").unwrap();

    std::fs::write(&template, "name=b\ncolor=red\nsize=1").unwrap();
    let second = h.run(&entry, normal());
    assert_eq!(second.merged, 1);
    assert_eq!(h.read(&rendered), "name=b\ncolor=blue\nsize=1");

    std::fs::write(&template, "name=b\ncolor=red\nsize=2").unwrap();
    let third = h.run(&entry, normal());
    assert_eq!(third.merged, 1);
    assert_eq!(third.conflicts, 0);
    assert_eq!(h.read(&rendered), "name=b\ncolor=blue\nsize=2");

    let record = h.store().lookup("app/conf.tmpl").unwrap().unwrap();
    assert_eq!(record.pure_render, b"name=b\ncolor=red\nsize=2".to_vec());
}

#[test]
fn test_conflict_writes_conflict_file_and_still_links() {
    let h = TestHarness::new();
    let template = h.write_backup("app/conf.tmpl", "a\nb\nc");
    let rendered = rendered_path(&template);
    let entry = h.folder_entry("app");

    h.run(&entry, normal());
    std::fs::write(&rendered, "a\nuser\nc").unwrap();
    std::fs::write(&template, "a\ntemplate\nc").unwrap();

    let summary = h.run(&entry, normal());
    assert_eq!(
        summary.outcome_for(&template),
        Some(FileOutcome::Merged { conflict: true })
    );
    assert_eq!(summary.conflicts, 1);
    assert!(!summary.has_failures());

    let merged = h.read(&rendered);
    assert!(merged.starts_with("a\n"));
    assert!(merged.contains(CONFLICT_START));
    assert!(merged.contains(CONFLICT_END));
    assert!(merged.ends_with("\nc"));
    assert_eq!(h.read(&conflict_path(&template)), merged);

    assert!(symlink_points_to(&h.target("app/conf"), &rendered));

    let record = h.store().lookup("app/conf.tmpl").unwrap().unwrap();
    assert_eq!(record.pure_render, b"a\ntemplate\nc".to_vec());
}

#[test]
fn test_dry_run_changes_nothing() {
    let h = TestHarness::new();
    let template = h.write_backup("app/hosts.tmpl", "Host={{ .Hostname }}");
    h.write_backup("app/plain.conf", "x");
    h.write_target("adopt-me/file", "mine");

    let options = ReconcileOptions {
        dry_run: true,
        force_render: false,
    };
    let summary = h.run(&h.folder_entry("app"), options);
    assert_eq!(summary.rendered, 1);
    assert_eq!(summary.linked, 1);

    let adopt = h.run(&h.folder_entry("adopt-me"), options);
    assert_eq!(adopt.adopted, 1);

    assert!(!rendered_path(&template).exists());
    assert!(!h.target("app").exists());
    assert!(!h.backup("adopt-me").exists());
    assert!(!is_symlink(&h.target("adopt-me")));
    assert_eq!(render_repo::count(h.store().database()).unwrap(), 0);
}

#[test]
fn test_dry_run_with_history_leaves_conflicting_edit_alone() {
    let h = TestHarness::new();
    let template = h.write_backup("app/conf.tmpl", "a\nb\nc");
    let rendered = rendered_path(&template);
    let entry = h.folder_entry("app");

    let store = MemoryRenderStore::new();
    Reconciler::new(h.platform().clone(), &store, &h.backup_root).reconcile_entry(&entry);
    assert_eq!(store.save_count(), 1);

    std::fs::write(&rendered, "a\nuser\nc").unwrap();
    std::fs::write(&template, "a\ntemplate\nc").unwrap();

    let summary = Reconciler::new(h.platform().clone(), &store, &h.backup_root)
        .with_options(ReconcileOptions {
            dry_run: true,
            force_render: false,
        })
        .reconcile_entry(&entry);

    assert_eq!(
        summary.outcome_for(&template),
        Some(FileOutcome::Merged { conflict: true }),
        "{}",
        summary
    );
    assert_eq!(summary.conflicts, 1);
    assert_eq!(h.read(&rendered), "a\nuser\nc");
    assert!(!conflict_path(&template).exists());
    assert!(!backup_path(&rendered).exists());
    assert_eq!(store.save_count(), 1);
    assert_eq!(
        store.lookup("app/conf.tmpl").unwrap().unwrap().pure_render,
        b"a\nb\nc".to_vec()
    );
}

struct CancelAfterFirstFile(CancelToken);

impl ProgressReporter for CancelAfterFirstFile {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::FileDone { .. } = event {
            self.0.cancel();
        }
    }
}

#[test]
fn test_cancellation_stops_walk_between_files() {
    let h = TestHarness::new();
    let a = h.write_backup("app/a.tmpl", "a");
    let b = h.write_backup("app/b.tmpl", "b");
    let c = h.write_backup("app/c.tmpl", "c");

    let cancel = CancelToken::new();
    let summary = h
        .reconciler(normal())
        .with_cancel(cancel.clone())
        .with_progress(Box::new(CancelAfterFirstFile(cancel)))
        .reconcile_entry(&h.folder_entry("app"));

    assert!(summary.cancelled);
    assert_eq!(summary.total(), 1);
    assert!(rendered_path(&a).exists());
    assert!(!rendered_path(&b).exists());
    assert!(!rendered_path(&c).exists());
}

#[test]
fn test_store_read_failure_degrades_to_first_render() {
    let h = TestHarness::new();
    let template = h.write_backup("app/conf.tmpl", "v={{ .OS }}");
    let entry = h.folder_entry("app");

    let store = MemoryRenderStore::new();
    let reconciler = Reconciler::new(h.platform().clone(), &store, &h.backup_root);
    reconciler.reconcile_entry(&entry);

    store.fail_reads(true);
    let summary = reconciler.reconcile_entry(&entry);
    assert_eq!(summary.outcome_for(&template), Some(FileOutcome::Rendered));
    assert!(!summary.has_failures());
    assert_eq!(h.read(&rendered_path(&template)), "v=linux");
}

#[test]
fn test_template_error_is_scoped_to_one_file() {
    let h = TestHarness::new();
    let bad = h.write_backup("app/bad.tmpl", "{{ .Nope }}");
    let unclosed = h.write_backup("app/broken.tmpl", "{{ if .HasDisplay }}x");
    let good = h.write_backup("app/good.tmpl", "ok {{ .User }}");

    let summary = h.run(&h.folder_entry("app"), normal());
    assert_eq!(summary.failures.len(), 2, "{}", summary);
    assert_eq!(summary.failures[0].path, bad);
    assert!(summary.failures[0].error.contains("Nope"));
    assert_eq!(summary.failures[1].path, unclosed);

    assert_eq!(summary.rendered, 1);
    assert_eq!(h.read(&rendered_path(&good)), "ok tester");
    assert!(!rendered_path(&bad).exists());
}

#[test]
fn test_force_render_overwrites_after_backup() {
    let h = TestHarness::new();
    let template = h.write_backup("app/hosts.tmpl", "Host={{ .Hostname }}");
    let rendered = rendered_path(&template);
    let entry = h.folder_entry("app");

    h.run(&entry, normal());
    std::fs::write(&rendered, "Host=edited").unwrap();

    let force = ReconcileOptions {
        dry_run: false,
        force_render: true,
    };
    let summary = h.run(&entry, force);
    assert_eq!(summary.outcome_for(&template), Some(FileOutcome::Rendered));
    assert_eq!(h.read(&rendered), "Host=myhost");
    assert_eq!(h.read(&backup_path(&rendered)), "Host=edited");
}

#[test]
fn test_other_platform_renders_differently() {
    let h = TestHarness::with_platform(
        dotweave::Platform::default()
            .with_os("darwin")
            .with_hostname("laptop"),
    );
    let template = h.write_backup(
        "app/shell.tmpl",
        r#"{{ if eq .OS "linux" }}bash{{ else }}zsh{{ end }}@{{ .Hostname }}"#,
    );

    h.run(&h.folder_entry("app"), normal());
    assert_eq!(h.read(&rendered_path(&template)), "zsh@laptop");
}

#[test]
fn test_reconcile_config_end_to_end() {
    let h = TestHarness::new();
    h.write_backup("app/hosts.tmpl", "Host={{ .Hostname }}");
    h.write_backup("nvim/init.lua", "-- init");

    let app_target = format!("{}/{{{{ .User }}}}-app", h.target_root.display());
    let config = ConfigBuilder::new(&h.backup_root)
        .state_database(&h.db_path)
        .entry(EntryBuilder::new("app").target("linux", &app_target).build())
        .entry(
            EntryBuilder::new("nvim")
                .target("linux", &h.target("nvim").to_string_lossy())
                .build(),
        )
        .entry(EntryBuilder::new("mac-only").target("darwin", "~/Library").build())
        .build();

    let summary = reconcile_config(&config, h.platform(), CancelToken::new()).unwrap();
    assert!(!summary.has_failures(), "{}", summary);
    assert_eq!(summary.rendered, 1);
    assert_eq!(summary.linked, 1);

    assert_eq!(h.read(&h.target("tester-app/hosts")), "Host=myhost");
    assert!(symlink_points_to(&h.target("nvim"), &h.backup("nvim")));
    assert_eq!(
        render_repo::list_paths(h.store().database()).unwrap(),
        vec!["app/hosts.tmpl".to_string()]
    );
}

#[test]
fn test_reconcile_config_cancelled_before_start() {
    let h = TestHarness::new();
    h.write_backup("app/hosts.tmpl", "x");
    let config = ConfigBuilder::new(&h.backup_root)
        .state_database(&h.db_path)
        .entry(
            EntryBuilder::new("app")
                .target("linux", &h.target("app").to_string_lossy())
                .build(),
        )
        .build();

    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = reconcile_config(&config, h.platform(), cancel).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.total(), 0);
    assert!(!h.target("app").exists());
}

#[test]
fn test_reconcile_config_dry_run_never_creates_database() {
    let h = TestHarness::new();
    let template = h.write_backup("app/hosts.tmpl", "Host={{ .Hostname }}");
    let config = ConfigBuilder::new(&h.backup_root)
        .state_database(&h.db_path)
        .dry_run(true)
        .entry(
            EntryBuilder::new("app")
                .target("linux", &h.target("app").to_string_lossy())
                .build(),
        )
        .build();

    let summary = reconcile_config(&config, h.platform(), CancelToken::new()).unwrap();
    assert!(!summary.has_failures(), "{}", summary);
    assert_eq!(summary.rendered, 1);

    assert!(!h.db_path.exists());
    assert!(!h.db_path.parent().unwrap().exists());
    assert!(!rendered_path(&template).exists());
    assert!(!h.target("app").exists());
}

#[test]
fn test_reconcile_config_dry_run_plans_against_existing_history() {
    let h = TestHarness::new();
    let template = h.write_backup("app/conf.tmpl", "a\nb\nc");
    let rendered = rendered_path(&template);
    let builder = || {
        ConfigBuilder::new(&h.backup_root)
            .state_database(&h.db_path)
            .entry(
                EntryBuilder::new("app")
                    .target("linux", &h.target("app").to_string_lossy())
                    .build(),
            )
    };

    reconcile_config(&builder().build(), h.platform(), CancelToken::new()).unwrap();
    std::fs::write(&rendered, "a\nuser\nc").unwrap();
    std::fs::write(&template, "a\nb\nnew").unwrap();

    let summary =
        reconcile_config(&builder().dry_run(true).build(), h.platform(), CancelToken::new())
            .unwrap();
    assert_eq!(
        summary.outcome_for(&template),
        Some(FileOutcome::Merged { conflict: false }),
        "{}",
        summary
    );
    assert_eq!(h.read(&rendered), "a\nuser\nc");

    let record = h.store().lookup("app/conf.tmpl").unwrap().unwrap();
    assert_eq!(record.pure_render, b"a\nb\nc".to_vec());
}
