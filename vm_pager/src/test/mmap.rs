/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use super::{check_consistency, get_test_pager, TEST_BASE};
use crate::{
    address::PAGE_SIZE,
    modules::file::MemoryFile,
    page_table::Backing,
    MmapError,
};

#[test]
fn test_mmap_rejects() {
    let pager = get_test_pager("test_mmap_rejects", 4, 4);
    let pid = pager.create_process();
    let file = MemoryFile::new(vec![1u8; 2 * PAGE_SIZE]).into_ref();
    let empty = MemoryFile::new(Vec::new()).into_ref();

    assert_eq!(pager.mmap(pid, &file, 0), Err(MmapError::NullAddress));
    assert_eq!(
        pager.mmap(pid, &file, TEST_BASE + 1),
        Err(MmapError::Unaligned(TEST_BASE + 1))
    );
    assert_eq!(pager.mmap(pid, &empty, TEST_BASE), Err(MmapError::EmptyFile));
    assert_eq!(
        pager.mmap(pid, &file, PAGE_SIZE),
        Err(MmapError::OutOfUserSpace(PAGE_SIZE))
    );

    // the second page would be the first kernel page
    let last = pager.config().user_top - PAGE_SIZE;
    assert_eq!(
        pager.mmap(pid, &file, last),
        Err(MmapError::OutOfUserSpace(last))
    );

    // collisions with a segment, anywhere in the range
    let segment = MemoryFile::new(vec![2u8; 10]).into_ref();
    pager
        .load_segment(pid, &segment, 0, TEST_BASE + PAGE_SIZE, 10, PAGE_SIZE - 10, false)
        .unwrap();
    assert_eq!(
        pager.mmap(pid, &file, TEST_BASE),
        Err(MmapError::Overlap(TEST_BASE + PAGE_SIZE))
    );

    // collisions with another mapping
    let first = pager.mmap(pid, &file, TEST_BASE + 4 * PAGE_SIZE).unwrap();
    assert_eq!(
        pager.mmap(pid, &file, TEST_BASE + 5 * PAGE_SIZE),
        Err(MmapError::Overlap(TEST_BASE + 5 * PAGE_SIZE))
    );

    // failed attempts created nothing
    assert!(pager.find_descriptor(pid, TEST_BASE).is_none());
    assert!(pager.find_descriptor(pid, TEST_BASE + 6 * PAGE_SIZE).is_none());

    let second = pager.mmap(pid, &file, TEST_BASE + 6 * PAGE_SIZE).unwrap();
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 2);

    pager.munmap(pid, first).unwrap();
    assert_eq!(pager.munmap(pid, first), Err(MmapError::UnknownMapping(first)));
    assert!(pager.find_descriptor(pid, TEST_BASE + 4 * PAGE_SIZE).is_none());
}

#[test]
fn test_munmap_untouched() {
    let pager = get_test_pager("test_munmap_untouched", 4, 4);
    let pid = pager.create_process();
    let file = MemoryFile::new(vec![3u8; 3 * PAGE_SIZE + 5]);

    let id = pager.mmap(pid, &file.clone().into_ref(), TEST_BASE).unwrap();

    for i in 0..4 {
        let descriptor = pager.find_descriptor(pid, TEST_BASE + i * PAGE_SIZE).unwrap();
        assert!(descriptor.writable);
        assert_eq!(descriptor.mapped.as_ref().map(|mapped| mapped.mapping), Some(id));

        match descriptor.backing {
            Backing::MappedFile(source) => {
                assert_eq!(source.offset, (i * PAGE_SIZE) as u64);
                assert_eq!(source.read_len, if i == 3 { 5 } else { PAGE_SIZE });
            }
            other => panic!("unexpected backing {:?}", other),
        }
    }
    assert!(pager.find_descriptor(pid, TEST_BASE + 4 * PAGE_SIZE).is_none());

    pager.munmap(pid, id).unwrap();
    assert_eq!(file.write_calls(), 0);
    assert!(pager.find_descriptor(pid, TEST_BASE).is_none());
    check_consistency(&pager);
}

#[test]
fn test_munmap_writes_one_dirty_page() {
    let pager = get_test_pager("test_munmap_writes_one_dirty_page", 8, 4);
    let sp = pager.config().user_top;

    let mut contents: Vec<u8> = (0..2 * PAGE_SIZE + 100).map(|i| (i % 7) as u8).collect();
    let file = MemoryFile::new(contents.clone());
    let pid = pager.create_process();
    let id = pager.mmap(pid, &file.clone().into_ref(), TEST_BASE).unwrap();

    // page 0 is only read, page 2 gets written
    let mut buffer = [0u8; 16];
    pager.read_user(pid, TEST_BASE, &mut buffer, sp).unwrap();
    assert_eq!(buffer[..], contents[..16]);

    pager
        .write_user(pid, TEST_BASE + 2 * PAGE_SIZE + 10, &[42, 43], sp)
        .unwrap();
    contents[2 * PAGE_SIZE + 10] = 42;
    contents[2 * PAGE_SIZE + 11] = 43;

    // bytes past the end of the file are writable but never reach it
    pager
        .write_user(pid, TEST_BASE + 2 * PAGE_SIZE + 200, &[99], sp)
        .unwrap();

    pager.munmap(pid, id).unwrap();
    assert_eq!(file.write_calls(), 1);
    assert_eq!(file.written_bytes(), 100);
    assert_eq!(file.contents(), contents);

    assert_eq!(pager.memory().used_frames(), 0);
    check_consistency(&pager);
}

#[test]
fn test_exit_flushes_mappings() {
    let pager = get_test_pager("test_exit_flushes_mappings", 4, 4);
    let sp = pager.config().user_top;

    let file = MemoryFile::new(vec![0u8; PAGE_SIZE]);
    let pid = pager.create_process();
    pager.mmap(pid, &file.clone().into_ref(), TEST_BASE).unwrap();

    pager.write_user(pid, TEST_BASE + 7, b"hello", sp).unwrap();
    assert_eq!(file.write_calls(), 0);

    assert!(pager.terminate(pid, 0));
    assert_eq!(file.write_calls(), 1);
    assert_eq!(&file.contents()[7..12], b"hello");

    // destroying again does nothing
    pager.destroy_address_space(pid);
    assert_eq!(file.write_calls(), 1);
    check_consistency(&pager);
}

#[test]
fn test_mmap_system_calls() {
    let pager = get_test_pager("test_mmap_system_calls", 4, 4);
    let sp = pager.config().user_top;

    let file = MemoryFile::new(vec![0u8; 2 * PAGE_SIZE]);
    let pid = pager.create_process();

    let fd = pager.open_file(pid, file.clone().into_ref()).unwrap();
    assert_eq!(fd, 2);

    assert_eq!(pager.sys_mmap(pid, 0, TEST_BASE), -1);
    assert_eq!(pager.sys_mmap(pid, fd + 1, TEST_BASE), -1);
    assert_eq!(pager.sys_mmap(pid, fd, TEST_BASE + 3), -1);

    let mapping = pager.sys_mmap(pid, fd, TEST_BASE);
    assert_eq!(mapping, 1);

    // the mapping keeps its own handle
    pager.close_file(pid, fd).unwrap();
    assert_eq!(pager.close_file(pid, fd), Err(MmapError::BadDescriptor(fd)));

    pager
        .write_user(pid, TEST_BASE + PAGE_SIZE, &[1, 2, 3], sp)
        .unwrap();

    pager.sys_munmap(pid, mapping);
    assert_eq!(&file.contents()[PAGE_SIZE..PAGE_SIZE + 3], &[1, 2, 3]);
    assert!(pager.find_descriptor(pid, TEST_BASE).is_none());

    // unknown ids are ignored
    pager.sys_munmap(pid, mapping);
    pager.sys_munmap(pid, -5);
    assert_eq!(file.write_calls(), 1);
}
