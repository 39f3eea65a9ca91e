/// Opens a NCA and prints its sections and the files inside them.
///
/// usage: nca_print_sections <nca> <header_key> [<key_area_key_application> <revision>]
use hacdec::{
    keyset::{KeyAreaKeyIndex, KeyTable},
    prelude::*,
    storage::FileStorage,
    utils::hex_str_to_array,
};

use std::sync::Arc;

fn main() -> HacResult<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);

    let fpath = args.next().expect("needs path to a nca as first argument");

    let header_key = args
        .next()
        .map(|s| hex_str_to_array::<0x20>(&s).expect("couldnt parse header_key"))
        .expect("needs header_key as second argument");
    let mut keys = KeyTable::empty().with_header_key(&header_key)?;

    if let Some(kaek) = args.next() {
        let kaek = hex_str_to_array::<0x10>(&kaek).expect("couldnt parse key_area_key");
        let revision = args
            .next()
            .and_then(|s| s.parse().ok())
            .expect("needs the key revision after the key_area_key");
        keys = keys.with_key_area_key(revision, KeyAreaKeyIndex::Application, kaek)?;
    }

    let nca = FileStorage::open(&fpath)?.map_to_storage::<Nca>(Arc::new(keys))?;
    let header = nca.header();
    println!(
        "{} {} {} [{}]",
        nca.version(),
        header.content_type,
        header.program_id,
        humansize::format_size(header.content_size, humansize::BINARY)
    );
    if !nca.rights_id().is_empty() {
        println!("  rights id {}", nca.rights_id());
    }

    for section in nca.sections() {
        let section = section?;
        println!(
            "  section {} @ 0x{:x} [{}] {}",
            section.index(),
            section.offset(),
            humansize::format_size(section.size(), humansize::BINARY),
            section.crypto(),
        );
    }

    let contents = nca.contents();
    for (index, content) in &contents.sections {
        println!("  section {index} ({}):", content.fs_name());
        match content.all_files() {
            Ok(files) => {
                for file in files {
                    println!(
                        "    {} [{}]",
                        file.path,
                        humansize::format_size(file.data.length()?, humansize::BINARY)
                    );
                }
            }
            Err(e) => println!("    {e}"),
        }
    }
    for warning in &contents.warnings {
        println!("  {warning}");
    }

    Ok(())
}
