//! 引擎各层的性质测试：分配器、索引节点层、目录层、路径解析、
//! 打开时的一致性修复。

mod common;

use common::MemDisk;
use snap_fs::{
    DiskInode, FsError, InodeKind, SnapFileSystem, BLOCK_SIZE, DATA_BLOCK_START, NO_BLOCK,
};

const CACHE_CAPACITY: usize = 64;

fn fresh_fs() -> SnapFileSystem {
    SnapFileSystem::format(MemDisk::new(), CACHE_CAPACITY).unwrap()
}

#[test]
fn inode_allocation_is_lowest_first() {
    let mut fs = fresh_fs();
    // inode 0 在格式化时留给了根目录
    assert_eq!(fs.alloc_inode().unwrap(), 1);
    assert_eq!(fs.alloc_inode().unwrap(), 2);

    fs.free_inode(1).unwrap();
    assert_eq!(fs.alloc_inode().unwrap(), 1);

    let sb = fs.super_block().unwrap();
    assert_eq!(sb.free_inode_count, sb.inode_count - 3);
}

#[test]
fn block_allocation_starts_at_data_region() {
    let mut fs = fresh_fs();
    let free_before = fs.super_block().unwrap().free_block_count;

    let block = fs.alloc_block().unwrap();
    assert_eq!(block as usize, DATA_BLOCK_START);
    assert_eq!(fs.ref_count(block).unwrap(), 1);
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before - 1);

    fs.free_block(block).unwrap();
    assert_eq!(fs.ref_count(block).unwrap(), 0);
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before);

    // 对已空闲块重复释放是无害的空操作
    fs.free_block(block).unwrap();
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before);
}

#[test]
fn refcount_aware_free() {
    let mut fs = fresh_fs();
    let block = fs.alloc_block().unwrap();
    fs.incref(block).unwrap();
    assert_eq!(fs.ref_count(block).unwrap(), 2);

    // 共享块的释放只递减计数，不动位图
    let free_before = fs.super_block().unwrap().free_block_count;
    fs.free_block(block).unwrap();
    assert_eq!(fs.ref_count(block).unwrap(), 1);
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before);

    fs.free_block(block).unwrap();
    assert_eq!(fs.ref_count(block).unwrap(), 0);
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before + 1);
}

#[test]
fn cow_copies_only_shared_blocks() {
    let mut fs = fresh_fs();
    let block = fs.alloc_block().unwrap();

    // 独占块原样返回
    assert_eq!(fs.cow(block).unwrap(), block);

    fs.incref(block).unwrap();
    let copy = fs.cow(block).unwrap();
    assert_ne!(copy, block);
    assert_eq!(fs.ref_count(block).unwrap(), 1);
    assert_eq!(fs.ref_count(copy).unwrap(), 1);
}

#[test]
fn incref_rejects_unallocated_block() {
    let mut fs = fresh_fs();
    let unallocated = (DATA_BLOCK_START + 100) as u32;
    assert!(matches!(
        fs.incref(unallocated),
        Err(FsError::Corrupt(_))
    ));
}

#[test]
fn file_data_round_trip() {
    let mut fs = fresh_fs();
    let inode_id = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);

    let payload = b"the quick brown fox";
    let written = fs.write_data(&mut inode, inode_id, payload, 0).unwrap();
    assert_eq!(written, payload.len());
    assert_eq!(inode.size as usize, payload.len());
    assert_eq!(inode.block_count, 1);

    let mut buf = vec![0u8; payload.len()];
    assert_eq!(fs.read_data(&inode, &mut buf, 0).unwrap(), payload.len());
    assert_eq!(&buf, payload);

    // 部分覆盖
    fs.write_data(&mut inode, inode_id, b"slow!", 4).unwrap();
    let mut buf = vec![0u8; payload.len()];
    fs.read_data(&inode, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"the slow! brown fox");
}

#[test]
fn zero_length_write_has_no_effect() {
    let mut fs = fresh_fs();
    let inode_id = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);

    let free_before = fs.super_block().unwrap().free_block_count;
    assert_eq!(fs.write_data(&mut inode, inode_id, b"", 0).unwrap(), 0);
    assert_eq!(inode.size, 0);
    assert_eq!(inode.block_count, 0);
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before);
}

#[test]
fn sparse_write_zero_fills_the_gap() {
    let mut fs = fresh_fs();
    let inode_id = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);

    fs.write_data(&mut inode, inode_id, b"tail", 1500).unwrap();
    assert_eq!(inode.size, 1504);
    assert_eq!(inode.block_count, 2);

    let mut buf = vec![0xFFu8; 1504];
    fs.read_data(&inode, &mut buf, 0).unwrap();
    assert!(buf[..1500].iter().all(|&b| b == 0));
    assert_eq!(&buf[1500..], b"tail");
}

#[test]
fn growth_past_direct_capacity_uses_indirect() {
    let mut fs = fresh_fs();
    let inode_id = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);

    let payload: Vec<u8> = (0..11 * BLOCK_SIZE)
        .map(|i| if i % 2 == 0 { 0xAA } else { 0x55 })
        .collect();
    let written = fs.write_data(&mut inode, inode_id, &payload, 0).unwrap();
    assert_eq!(written, payload.len());

    assert_eq!(inode.block_count, 11);
    assert!(inode.direct.iter().all(|&b| b != NO_BLOCK));
    assert_ne!(inode.indirect, NO_BLOCK);

    let mut buf = vec![0u8; payload.len()];
    assert_eq!(fs.read_data(&inode, &mut buf, 0).unwrap(), payload.len());
    assert_eq!(buf, payload);
}

#[test]
fn read_past_eof_returns_zero() {
    let mut fs = fresh_fs();
    let inode_id = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);
    fs.write_data(&mut inode, inode_id, b"abc", 0).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(fs.read_data(&inode, &mut buf, 3).unwrap(), 0);
    assert_eq!(fs.read_data(&inode, &mut buf, 100).unwrap(), 0);
}

#[test]
fn free_blocks_returns_space_and_resets_map() {
    let mut fs = fresh_fs();
    let inode_id = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);

    let free_before = fs.super_block().unwrap().free_block_count;
    let payload = vec![7u8; 12 * BLOCK_SIZE];
    fs.write_data(&mut inode, inode_id, &payload, 0).unwrap();
    // 12 个数据块加 1 个间接索引块
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before - 13);

    fs.free_inode_blocks(&mut inode).unwrap();
    assert_eq!(fs.super_block().unwrap().free_block_count, free_before);
    assert_eq!(inode.block_count, 0);
    assert_eq!(inode.size, 0);
    assert!(inode.direct.iter().all(|&b| b == NO_BLOCK));
    assert_eq!(inode.indirect, NO_BLOCK);
}

#[test]
fn directory_add_find_remove() {
    let mut fs = fresh_fs();
    let root = snap_fs::ROOT_INODE;

    let a = fs.alloc_inode().unwrap();
    let b = fs.alloc_inode().unwrap();
    let c = fs.alloc_inode().unwrap();
    fs.dir_add(root, "a", a).unwrap();
    fs.dir_add(root, "b", b).unwrap();
    fs.dir_add(root, "c", c).unwrap();

    let parent = fs.read_inode(root).unwrap();
    // 目录大小始终是条目大小的整数倍
    assert_eq!(parent.size % 64, 0);
    assert_eq!(parent.size / 64, 3);
    assert_eq!(fs.dir_find(&parent, "b").unwrap(), b);

    // 重名被拒绝
    assert!(matches!(
        fs.dir_add(root, "a", c),
        Err(FsError::AlreadyExists)
    ));

    // 末项换位删除保持排列紧密
    let mut parent = fs.read_inode(root).unwrap();
    fs.dir_remove(&mut parent, root, "a").unwrap();
    let parent = fs.read_inode(root).unwrap();
    assert_eq!(parent.size / 64, 2);
    let names: Vec<String> = fs
        .dir_entries(&parent)
        .unwrap()
        .iter()
        .map(|e| e.name().to_owned())
        .collect();
    assert_eq!(names, ["c", "b"]);

    assert!(matches!(
        fs.dir_find(&parent, "a"),
        Err(FsError::NotFound)
    ));
}

#[test]
fn directory_rejects_long_names() {
    let mut fs = fresh_fs();
    let name = "x".repeat(60);
    assert!(matches!(
        fs.dir_add(snap_fs::ROOT_INODE, &name, 1),
        Err(FsError::NameTooLong)
    ));
}

#[test]
fn path_resolution() {
    let mut fs = fresh_fs();
    let root = snap_fs::ROOT_INODE;

    let docs = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::Directory);
    fs.write_inode(docs, &inode).unwrap();
    fs.dir_add(root, "docs", docs).unwrap();

    let paper = fs.alloc_inode().unwrap();
    let mut inode = DiskInode::default();
    inode.init(InodeKind::File);
    fs.write_inode(paper, &inode).unwrap();
    fs.dir_add(docs, "paper.txt", paper).unwrap();

    assert_eq!(fs.resolve("/").unwrap(), root);
    assert_eq!(fs.resolve("/docs").unwrap(), docs);
    assert_eq!(fs.resolve("/docs/paper.txt").unwrap(), paper);
    // 连续斜杠产生的空路径项被跳过
    assert_eq!(fs.resolve("//docs///paper.txt").unwrap(), paper);

    assert!(matches!(fs.resolve("/missing"), Err(FsError::NotFound)));
    // 中间项是文件
    assert!(matches!(
        fs.resolve("/docs/paper.txt/x"),
        Err(FsError::NotADirectory)
    ));

    let (parent, name) = fs.parent_and_name("/docs/paper.txt").unwrap();
    assert_eq!(parent, docs);
    assert_eq!(name, "paper.txt");
    let (parent, name) = fs.parent_and_name("/docs/paper.txt/").unwrap();
    assert_eq!(parent, docs);
    assert_eq!(name, "paper.txt");
    assert!(fs.parent_and_name("/").is_err());
}

#[test]
fn reopen_preserves_volume() {
    let device = MemDisk::new();
    {
        let mut fs = SnapFileSystem::format(device.clone(), CACHE_CAPACITY).unwrap();
        let inode_id = fs.alloc_inode().unwrap();
        let mut inode = DiskInode::default();
        inode.init(InodeKind::File);
        fs.write_data(&mut inode, inode_id, b"persistent", 0).unwrap();
        fs.dir_add(snap_fs::ROOT_INODE, "f", inode_id).unwrap();
    }

    let mut fs = SnapFileSystem::open(device, CACHE_CAPACITY).unwrap();
    let inode_id = fs.resolve("/f").unwrap();
    let inode = fs.read_inode(inode_id).unwrap();
    let mut buf = vec![0u8; inode.size as usize];
    fs.read_data(&inode, &mut buf, 0).unwrap();
    assert_eq!(&buf, b"persistent");
}

#[test]
fn open_reformats_blank_and_alien_volumes() {
    use block_dev::BlockDevice;

    // 空白设备
    let mut fs = SnapFileSystem::open(MemDisk::new(), CACHE_CAPACITY).unwrap();
    assert!(fs.super_block().unwrap().is_valid());
    assert_eq!(fs.resolve("/").unwrap(), snap_fs::ROOT_INODE);

    // 魔数不对的设备
    let device = MemDisk::new();
    device.write_block(0, &[0x5A; BLOCK_SIZE]).unwrap();
    let mut fs = SnapFileSystem::open(device, CACHE_CAPACITY).unwrap();
    assert!(fs.super_block().unwrap().is_valid());
}

/// 打开时的修复扫描：小漂移保留，大漂移改写为位图真值
#[test]
fn fsck_corrects_large_counter_drift_only() {
    use block_dev::BlockDevice;

    let device = MemDisk::new();
    let true_free = {
        let mut fs = SnapFileSystem::format(device.clone(), CACHE_CAPACITY).unwrap();
        fs.super_block().unwrap().free_block_count
    };

    // free_block_count 在超级块里的字节偏移
    const FREE_BLOCK_OFFSET: usize = 16;

    let patch = |drifted: u32| {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(0, &mut block).unwrap();
        block[FREE_BLOCK_OFFSET..FREE_BLOCK_OFFSET + 4].copy_from_slice(&drifted.to_le_bytes());
        device.write_block(0, &block).unwrap();
    };

    patch(true_free - 3);
    let mut fs = SnapFileSystem::open(device.clone(), CACHE_CAPACITY).unwrap();
    assert_eq!(fs.super_block().unwrap().free_block_count, true_free - 3);
    drop(fs);

    patch(true_free - 10);
    let mut fs = SnapFileSystem::open(device, CACHE_CAPACITY).unwrap();
    assert_eq!(fs.super_block().unwrap().free_block_count, true_free);
}

/// 打开时的修复扫描：已分配块的引用计数不可能是 0
#[test]
fn fsck_repairs_impossible_refcounts() {
    use block_dev::BlockDevice;
    use snap_fs::REFCOUNT_TABLE_START;

    let device = MemDisk::new();
    let block = {
        let mut fs = SnapFileSystem::format(device.clone(), CACHE_CAPACITY).unwrap();
        fs.alloc_block().unwrap()
    };

    // 直接在设备上把该块的计数抹成 0
    let mut counts = [0u8; BLOCK_SIZE];
    device.read_block(REFCOUNT_TABLE_START, &mut counts).unwrap();
    counts[block as usize] = 0;
    device.write_block(REFCOUNT_TABLE_START, &counts).unwrap();

    let mut fs = SnapFileSystem::open(device, CACHE_CAPACITY).unwrap();
    assert_eq!(fs.ref_count(block).unwrap(), 1);
}
