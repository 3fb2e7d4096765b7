//! 子プロセスを使ったプロセス制御とメモリアクセスのテスト

use dbgkit_target::{Memory, Process, TrapEncoding, WaitOutcome};

#[test]
fn test_spawn_and_run_to_exit() {
    let mut process = Process::spawn("/bin/true", &[]).expect("Failed to spawn /bin/true");
    assert!(process.pid() > 0);

    let outcome = process.continue_and_wait(None).expect("Failed to continue");
    assert_eq!(outcome, WaitOutcome::Exited(0));
    assert!(outcome.is_terminal());
}

#[test]
fn test_spawn_missing_program_fails() {
    let result = Process::spawn("/nonexistent/dbgkit-test-program", &[]);
    assert!(result.is_err());
}

#[test]
fn test_word_patch_round_trip() {
    let process = Process::spawn("/bin/true", &[]).expect("Failed to spawn /bin/true");
    let memory = Memory::new(process.pid());

    let entry = memory.entry_address().expect("Failed to read AT_ENTRY");
    assert_ne!(entry, 0);

    let original = memory.read_word(entry).expect("Failed to read entry word");
    let trap = TrapEncoding::native();

    memory.write_word(entry, trap.patch(original)).expect("Failed to patch");
    let patched = memory.read_word(entry).unwrap();
    assert!(trap.is_patched(patched));
    // トラップ以外のバイトは変わらない
    assert_eq!(trap.restore(patched, 0), trap.restore(original, 0));

    memory.write_word(entry, trap.restore(patched, original)).expect("Failed to restore");
    assert_eq!(memory.read_word(entry).unwrap(), original);
}

#[test]
fn test_read_unmapped_address_fails() {
    let process = Process::spawn("/bin/true", &[]).expect("Failed to spawn /bin/true");
    let memory = Memory::new(process.pid());

    assert!(memory.read_word(0).is_err());
    assert!(memory.write_word(0, 0).is_err());
}

#[test]
fn test_attach_to_missing_process_fails() {
    // pid_max を超えるPIDは存在しない
    let err = Process::attach(i32::MAX).err().expect("attach should fail");
    assert_eq!(
        err.downcast_ref::<nix::errno::Errno>(),
        Some(&nix::errno::Errno::ESRCH)
    );
}
