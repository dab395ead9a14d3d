//! Running out of frames and file table entries

use cartframe::{CartError, FrameSlot, FrameStore, MemoryDevice, StoreConfig, FRAME_SIZE};

fn store(frames: usize, max_files: usize) -> FrameStore<MemoryDevice> {
    let config = StoreConfig {
        cartridges: 1,
        frames_per_cartridge: frames,
        cache_frames: 2,
        max_files,
        ..StoreConfig::default()
    };
    let device = MemoryDevice::new(config.geometry().unwrap());
    let mut store = FrameStore::new(config, device).unwrap();
    store.power_on().unwrap();
    store
}

#[test]
fn test_open_exhausts_frames() {
    let mut store = store(4, 16);
    for name in ["a", "b", "c", "d"] {
        store.open(name).unwrap();
    }
    assert_eq!(store.free_frames(), 0);

    assert!(matches!(store.open("e"), Err(CartError::Exhausted)));
    // The failed open leaves no table entry behind.
    assert!(store.lookup("e").is_none());
    assert_eq!(store.open_files().len(), 4);
}

#[test]
fn test_close_frees_frames_for_reuse() {
    let mut store = store(4, 16);
    let mut handles = Vec::new();
    for name in ["a", "b", "c", "d"] {
        handles.push(store.open(name).unwrap());
    }

    store.close(handles[1]).unwrap();
    assert_eq!(store.free_frames(), 1);

    let e = store.open("e").unwrap();
    assert_eq!(store.frames(e).unwrap(), vec![FrameSlot::new(0, 1)]);
}

#[test]
fn test_short_write_then_exhausted() {
    let mut store = store(4, 16);
    let handle = store.open("big").unwrap();

    let written = store.write(handle, &vec![7u8; 5000]).unwrap();
    assert_eq!(written, 4 * FRAME_SIZE);
    assert_eq!(store.size(handle).unwrap(), 4096);

    assert!(matches!(
        store.write(handle, b"x"),
        Err(CartError::Exhausted)
    ));
    assert_eq!(store.size(handle).unwrap(), 4096);

    store.seek(handle, 0).unwrap();
    assert_eq!(store.read_to_vec(handle, 5000).unwrap(), vec![7u8; 4096]);
}

#[test]
fn test_growth_never_moves_backward() {
    let mut store = store(4, 16);
    let a = store.open("a").unwrap();
    let b = store.open("b").unwrap();
    store.close(a).unwrap();

    assert_eq!(store.write(b, &vec![1u8; 3 * FRAME_SIZE]).unwrap(), 3 * FRAME_SIZE);
    assert_eq!(
        store.frames(b).unwrap(),
        vec![
            FrameSlot::new(0, 1),
            FrameSlot::new(0, 2),
            FrameSlot::new(0, 3)
        ]
    );

    // Frame (0, 0) is free but sits before the end of b's chain.
    assert_eq!(store.free_frames(), 1);
    assert!(matches!(store.write(b, b"more"), Err(CartError::Exhausted)));

    let c = store.open("c").unwrap();
    assert_eq!(store.frames(c).unwrap(), vec![FrameSlot::new(0, 0)]);
}

#[test]
fn test_table_full_and_name_rules() {
    let mut store = store(16, 2);
    store.open("one").unwrap();
    assert!(matches!(
        store.open("one"),
        Err(CartError::AlreadyOpen(_))
    ));
    store.open("two").unwrap();
    assert!(matches!(store.open("three"), Err(CartError::TableFull)));

    let one = store.lookup("one").unwrap();
    store.close(one).unwrap();
    assert!(matches!(store.open(""), Err(CartError::InvalidName(_))));
    assert!(matches!(
        store.open(&"n".repeat(129)),
        Err(CartError::InvalidName(_))
    ));
    store.open("three").unwrap();
}

#[test]
fn test_stale_handle_rejected() {
    let mut store = store(4, 16);
    let handle = store.open("a").unwrap();
    store.close(handle).unwrap();

    assert!(matches!(
        store.write(handle, b"late"),
        Err(CartError::InvalidHandle(_))
    ));
    assert!(matches!(
        store.seek(handle, 0),
        Err(CartError::InvalidHandle(_))
    ));
    assert!(matches!(store.close(handle), Err(CartError::InvalidHandle(_))));
    let mut buf = [0u8; 16];
    assert!(matches!(
        store.read(handle, &mut buf),
        Err(CartError::InvalidHandle(_))
    ));
}

#[test]
fn test_reused_entry_has_no_stale_state() {
    let mut store = store(8, 16);
    let old = store.open("old").unwrap();
    store.write(old, &vec![3u8; 2500]).unwrap();
    store.close(old).unwrap();

    let new = store.open("new").unwrap();
    assert_eq!(new, old);
    assert_eq!(store.size(new).unwrap(), 0);
    assert_eq!(store.tell(new).unwrap(), 0);
    assert_eq!(store.frames(new).unwrap().len(), 1);
    let mut buf = [0u8; 16];
    assert_eq!(store.read(new, &mut buf).unwrap(), 0);
}
