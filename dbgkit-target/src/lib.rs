//! dbgkit ターゲットプロセス制御
//!
//! このクレートは、デバッグ対象のプロセスを制御するための低レベル機能を提供します。
//! ptraceによる起動・アタッチ、ワード単位のメモリアクセス、レジスタアクセス、
//! アーキテクチャごとのトラップ命令のエンコーディングなどを行います。

pub mod process;
pub mod memory;
pub mod registers;
pub mod breakpoint;

pub use process::{Process, WaitOutcome};
pub use memory::Memory;
pub use registers::Registers;
pub use breakpoint::TrapEncoding;

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
