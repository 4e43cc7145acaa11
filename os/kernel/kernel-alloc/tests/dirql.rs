use kernel_alloc::{MappingConfig, PagingContext, PoolExhausted};
use kernel_memory_addresses::{PhysicalPage, Size4K, Size4M, VirtualAddress};
use kernel_vmem::sim::SoftMmu;
use kernel_vmem::{DirectoryIndex, PageTableEntry, PdeView, TableIndex};

const VA_4K: VirtualAddress = VirtualAddress::new(0xC012_3456);
const VA_4M: VirtualAddress = VirtualAddress::new(0x4000_1234);

struct Fixture {
    mmu: SoftMmu,
    table: PhysicalPage<Size4K>,
    data: PhysicalPage<Size4K>,
}

fn fixture() -> (Fixture, kernel_vmem::AddressSpaceId) {
    let mmu = SoftMmu::with_frames(64);
    let space = mmu.new_space();
    let data = mmu.alloc_frame();
    let table = mmu.map_4k(space, VA_4K, data, PageTableEntry::new_common_rw());
    mmu.map_4m(space, VA_4M, PhysicalPage::<Size4M>::from_frame_number(3));
    (Fixture { mmu, table, data }, space)
}

#[test]
fn pde_of_table_mapping() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default(),
    )
    .expect("pool setup");

    let pde = ctx.map_in_pde_dirql(VA_4K).expect("free slot");
    let PdeView::Table(table) = pde.view() else {
        panic!("expected a table entry, got {:?}", *pde);
    };
    assert_eq!(table.page_table(), fx.table);
    assert_eq!(ctx.outstanding(), 1);

    let slot = ctx.page_va(0).expect("first slot");
    assert_eq!(
        pde.virtual_address(),
        VirtualAddress::new(slot.as_u32() + 0x300 * 4)
    );

    ctx.map_out_entry_dirql(pde);
    assert_eq!(ctx.outstanding(), 0);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn pde_writes_reach_the_directory() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default(),
    )
    .expect("pool setup");

    let mut pde = ctx.map_in_pde_dirql(VA_4M).expect("free slot");
    assert!(pde.large_page());
    *pde = kernel_vmem::PageDirectoryEntry::zero();
    drop(pde);

    assert!(!fx.mmu.pde(space, DirectoryIndex::from_address(VA_4M)).present());
    assert_eq!(fx.mmu.translate(space, VA_4M), None);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn pte_of_table_mapping() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default(),
    )
    .expect("pool setup");

    let mut pte = ctx
        .map_in_pte_dirql(VA_4K)
        .expect("free slot")
        .expect("table-backed address");
    assert_eq!(pte.page_4k(), Some(fx.data));
    assert_eq!(ctx.outstanding(), 1, "directory slot already returned");

    pte.set_writable(false);
    ctx.map_out_entry_dirql(pte);

    let stored = fx.mmu.pte(fx.table, TableIndex::from_address(VA_4K));
    assert!(stored.present());
    assert!(!stored.writable());
    assert_eq!(ctx.outstanding(), 0);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn pte_absent_for_large_pages() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default(),
    )
    .expect("pool setup");

    let pte = ctx.map_in_pte_dirql(VA_4M).expect("free slot");
    assert!(pte.is_none());
    assert_eq!(ctx.outstanding(), 0, "directory slot returned");
    drop(pte);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn single_slot_pool_resolves_ptes() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default().with_pages(1),
    )
    .expect("pool setup");

    let pte = ctx
        .map_in_pte_dirql(VA_4K)
        .expect("one slot suffices")
        .expect("table-backed address");
    assert_eq!(pte.page_4k(), Some(fx.data));

    assert_eq!(ctx.map_in_pde_dirql(VA_4K).err(), Some(PoolExhausted));
    drop(pte);

    let pde = ctx.map_in_pde_dirql(VA_4K).expect("slot returned on drop");
    drop(pde);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn exhausted_pool_reports_error() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default().with_pages(2),
    )
    .expect("pool setup");

    let a = ctx.alloc_page().expect("free slot");
    let b = ctx.alloc_page().expect("free slot");
    assert_eq!(ctx.map_in_pde_dirql(VA_4K).err(), Some(PoolExhausted));
    assert!(matches!(ctx.map_in_pte_dirql(VA_4K), Err(PoolExhausted)));
    assert_eq!(PoolExhausted.to_string(), "DIRQL mapping pool exhausted");

    ctx.free_page(a);
    ctx.free_page(b);
    ctx.end_mapping_operations(&mut frames);
}

#[test]
fn resolver_makes_no_general_purpose_mappings() {
    let (fx, space) = fixture();
    let mut frames = fx.mmu.allocator();
    let ctx = PagingContext::init_mapping_operations(
        &fx.mmu,
        &mut frames,
        space,
        &MappingConfig::default(),
    )
    .expect("pool setup");
    let before = fx.mmu.mappings_made();

    for _ in 0..100 {
        let pte = ctx.map_in_pte_dirql(VA_4K).expect("free slot");
        drop(pte);
        let pde = ctx.map_in_pde_dirql(VA_4M).expect("free slot");
        drop(pde);
    }

    assert_eq!(fx.mmu.mappings_made(), before);
    assert_eq!(ctx.outstanding(), 0);
    ctx.end_mapping_operations(&mut frames);
}
