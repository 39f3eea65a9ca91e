/// Lists the partitions of a XCI and the files in each of them.
use hacdec::{prelude::*, storage::FileStorage};

fn main() -> HacResult<()> {
    env_logger::init();

    let fpath = std::env::args()
        .nth(1)
        .expect("needs path to a xci as first argument");

    let xci = FileStorage::open(&fpath)?.map_to_storage::<Xci>(())?;
    let header = xci.header();
    println!(
        "{fpath}: {} card, package id {:016x}",
        header.cart_type_name().unwrap_or("unknown"),
        header.package_id
    );

    for partition in xci.partitions() {
        println!(
            "{} @ 0x{:x} [{}]",
            partition.name(),
            partition.offset(),
            humansize::format_size(partition.size(), humansize::BINARY)
        );
        for file in partition.fs().files() {
            println!(
                "  {} [{}]",
                file.name(),
                humansize::format_size(file.size(), humansize::BINARY)
            );
        }
    }

    for warning in xci.warnings() {
        println!("skipped {}: {}", warning.name, warning.reason);
    }

    Ok(())
}
