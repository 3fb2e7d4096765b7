//! ループバックのTCPリスナーを相手にリモートカーネルバックエンドを動かすテスト

use dbgkit_core::remote::header::{HEADER_LEN, UNBOUND_PORT};
use dbgkit_core::{
    AttachError, AttachTarget, BackendKind, BreakpointLocation, DebugError, DebuggerContract,
    RemoteDebugHeader, RemoteKernelBackend, StopReason, TargetState, TextProtocol,
};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;

fn remote(addr: SocketAddr) -> AttachTarget {
    AttachTarget::Remote {
        kernel: "/boot/ne_kernel".into(),
        addr,
    }
}

#[test]
fn test_pending_protocol_fails_clearly() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut backend = RemoteKernelBackend::new();
    assert_eq!(backend.kind(), BackendKind::RemoteKernel);

    let err = backend.attach(&remote(addr)).unwrap_err();
    assert!(matches!(err, DebugError::NotImplemented("attach")));
    assert_eq!(backend.target().state(), TargetState::Detached);

    assert!(matches!(backend.continue_execution(), Err(DebugError::NotAttached)));
}

#[test]
fn test_transport_failure_is_distinct() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let mut backend = RemoteKernelBackend::with_protocol(TextProtocol);
    let err = backend.attach(&remote(addr)).unwrap_err();
    assert!(matches!(err, DebugError::Transport(_)));
    assert_eq!(backend.target().state(), TargetState::Detached);
}

#[test]
fn test_rejects_local_targets() {
    let mut backend = RemoteKernelBackend::new();
    let err = backend.attach(&AttachTarget::Process(1)).unwrap_err();
    assert!(matches!(err, DebugError::Attach(AttachError::Unsupported(_))));
}

#[test]
fn test_text_protocol_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let agent = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received
    });

    let mut backend = RemoteKernelBackend::with_protocol(TextProtocol);
    backend.attach(&remote(addr)).unwrap();
    assert_eq!(backend.kernel(), Some("/boot/ne_kernel"));
    assert!(matches!(backend.attach(&remote(addr)), Err(DebugError::AlreadyAttached(_))));

    let sym = BreakpointLocation::Symbol("hal_init".into());
    assert_eq!(backend.set_breakpoint(&sym).unwrap(), None);
    // 2回目は送信しない
    backend.set_breakpoint(&sym).unwrap();
    assert_eq!(backend.requested_breakpoints(), &[sym]);
    assert!(backend.breakpoints().is_empty());

    assert!(matches!(
        backend.set_breakpoint(&BreakpointLocation::Address(0x1000)),
        Err(DebugError::NotImplemented(_))
    ));

    assert_eq!(backend.continue_execution().unwrap(), StopReason::Unreported);
    assert_eq!(backend.target().state(), TargetState::Running);

    backend.request_break().unwrap();
    assert_eq!(backend.target().state(), TargetState::Stopped);

    assert!(matches!(backend.step(), Err(DebugError::NotImplemented("step"))));

    backend.detach().unwrap();
    assert_eq!(backend.target().state(), TargetState::Detached);
    assert!(backend.requested_breakpoints().is_empty());

    let received = agent.join().unwrap();
    assert_eq!(
        String::from_utf8(received).unwrap(),
        "VMK1.0.0;;\rVMK1.0.0;;SYM=hal_init;\rVMK1.0.0;;CONT=1;\rVMK1.0.0;;BRK=1;\rVMK1.0.0;;DTCH=1;\r"
    );
}

#[test]
fn test_header_exchange() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let agent = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut hello = [0u8; 11];
        stream.read_exact(&mut hello).unwrap();

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).unwrap();
        // そのまま送り返す
        stream.write_all(&header).unwrap();
        hello
    });

    let mut backend = RemoteKernelBackend::with_protocol(TextProtocol);
    backend.attach(&remote(addr)).unwrap();

    let header = RemoteDebugHeader::new(UNBOUND_PORT, 1, b"ping").unwrap();
    backend.send_header(&header).unwrap();
    assert_eq!(backend.receive_header().unwrap(), header);

    assert_eq!(&agent.join().unwrap(), b"VMK1.0.0;;\r");
    backend.detach().unwrap();
}
