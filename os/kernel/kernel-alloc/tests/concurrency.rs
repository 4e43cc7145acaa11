use kernel_alloc::{MappingConfig, PagingContext};
use kernel_memory_addresses::{Size4M, VirtualAddress, VirtualPage};
use kernel_vmem::sim::SoftMmu;
use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;

/// Allocate every page of `ctx`, stamp it and hand it back.
fn drain_and_stamp(ctx: &PagingContext<'_, SoftMmu>, stamp: u32) -> Vec<VirtualAddress> {
    let pages: Vec<_> = std::iter::from_fn(|| ctx.alloc_page()).collect();
    assert_eq!(pages.len(), ctx.pages());

    for page in &pages {
        // SAFETY: every pool page is 4 KiB of writable memory owned by this context.
        unsafe { page.as_ptr().cast::<u32>().write(stamp) };
    }
    for page in &pages {
        // SAFETY: as above.
        assert_eq!(unsafe { page.as_ptr().cast::<u32>().read() }, stamp);
    }

    let addresses = pages.iter().map(|p| p.virtual_address()).collect();
    for page in pages {
        ctx.free_page(page);
    }
    addresses
}

#[test]
fn per_processor_contexts_do_not_overlap() {
    let mmu = SoftMmu::with_frames(128);
    let space = mmu.new_space();
    let windows = [0x3FE, 0x3FD, 0x3FC].map(VirtualPage::<Size4M>::from_page_number);

    let results: Vec<Vec<VirtualAddress>> = thread::scope(|s| {
        let handles: Vec<_> = windows
            .iter()
            .zip(1u32..)
            .map(|(&window, stamp)| {
                let mmu = &mmu;
                s.spawn(move || {
                    let mut frames = mmu.allocator();
                    let config = MappingConfig::default().with_pages(8).with_window(window);
                    let ctx =
                        PagingContext::init_mapping_operations(mmu, &mut frames, space, &config)
                            .expect("pool setup");

                    let mut seen = Vec::new();
                    for _ in 0..50 {
                        seen = drain_and_stamp(&ctx, stamp);
                    }
                    ctx.end_mapping_operations(&mut frames);
                    seen
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect()
    });

    let mut all = HashSet::new();
    for (addresses, window) in results.iter().zip(windows) {
        for va in addresses {
            assert_eq!(va.page::<Size4M>(), window, "slot outside its own window");
            assert!(all.insert(*va), "{va} handed out by two contexts");
        }
    }
    assert_eq!(all.len(), 3 * 8);
    assert_eq!(mmu.outstanding_mappings(), 0);
}

#[test]
fn context_moves_between_threads() {
    let mmu = SoftMmu::with_frames(32);
    let space = mmu.new_space();
    let mut frames = mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &mmu,
        &mut frames,
        space,
        &MappingConfig::default(),
    )
    .expect("pool setup");

    let ctx = thread::scope(|s| {
        s.spawn(move || {
            drain_and_stamp(&ctx, 7);
            ctx
        })
        .join()
        .expect("worker panicked")
    });

    assert_eq!(ctx.outstanding(), 0);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn shared_context_behind_external_lock() {
    let mmu = SoftMmu::with_frames(32);
    let space = mmu.new_space();
    let mut frames = mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &mmu,
        &mut frames,
        space,
        &MappingConfig::default().with_pages(4),
    )
    .expect("pool setup");
    let shared = Mutex::new(ctx);

    thread::scope(|s| {
        for stamp in 0..4u32 {
            let shared = &shared;
            s.spawn(move || {
                for _ in 0..100 {
                    let ctx = shared.lock().expect("poisoned");
                    let page = ctx.alloc_page().expect("pool has a free slot under the lock");
                    // SAFETY: the page is exclusively ours until it is freed.
                    unsafe { page.as_ptr().cast::<u32>().write(stamp) };
                    // SAFETY: as above.
                    assert_eq!(unsafe { page.as_ptr().cast::<u32>().read() }, stamp);
                    ctx.free_page(page);
                }
            });
        }
    });

    let ctx = shared.into_inner().expect("poisoned");
    assert_eq!(ctx.outstanding(), 0);
    ctx.end_mapping_operations(&mut frames);
    assert_eq!(mmu.outstanding_mappings(), 0);
}
