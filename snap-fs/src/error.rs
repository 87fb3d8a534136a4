use std::io;

use derive_more::Display;

pub type FsResult<T> = Result<T, FsError>;

/// 引擎的全部错误种类。
///
/// 每种失败条件独立成一个变体，上层据此区分重名、写失败等情况，
/// 不会把多种条件压成同一个值。
#[derive(Debug, Display)]
pub enum FsError {
    /// 路径解析失败
    #[display("path not found")]
    NotFound,
    /// 目标不是文件
    #[display("not a file")]
    NotAFile,
    /// 目标不是目录
    #[display("not a directory")]
    NotADirectory,
    /// 目录中已有同名条目，或目标位置已被非目录占用
    #[display("already exists")]
    AlreadyExists,
    /// 目录项名或快照名超出上限
    #[display("name too long")]
    NameTooLong,
    /// inode 位图中没有空位
    #[display("out of inodes")]
    ExhaustedInodes,
    /// 数据区没有空闲块
    #[display("out of blocks")]
    ExhaustedBlocks,
    /// 单个文件超出可寻址容量
    #[display("file exceeds maximum size")]
    FileTooLarge,
    /// 目录写入在重试后仍未完整落盘
    #[display("write failed")]
    WriteFailed,
    #[display("snapshot not found")]
    SnapshotNotFound,
    #[display("snapshot table full")]
    SnapshotTableFull,
    #[display("snapshot name taken")]
    SnapshotNameTaken,
    /// 底层设备 I/O 失败
    #[display("i/o error: {_0}")]
    Io(io::Error),
    /// 结构不变量被破坏，属于 bug 或磁盘损坏
    #[display("corrupt filesystem: {_0}")]
    Corrupt(&'static str),
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
