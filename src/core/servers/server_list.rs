use std::path::Path;

use tracing::{debug, info};

use super::nbt::{Compound, NbtDocument, Tag};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::ServerTarget;
use crate::core::storage::write_atomic;

const SERVERS_KEY: &str = "servers";
const COMPOUND_ID: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// One row of the in-game server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub name: String,
    pub ip: String,
    pub accept_textures: Option<bool>,
}

fn same_server(a: &str, b: &str) -> bool {
    let a = ServerTarget::parse(a);
    let b = ServerTarget::parse(b);
    a.host.eq_ignore_ascii_case(&b.host) && a.port_or_default() == b.port_or_default()
}

async fn load(file: &Path) -> LauncherResult<NbtDocument> {
    match tokio::fs::read(file).await {
        Ok(bytes) if bytes.is_empty() => Ok(NbtDocument::empty_compound()),
        Ok(bytes) => NbtDocument::decode(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NbtDocument::empty_compound()),
        Err(e) => Err(LauncherError::io(file, e)),
    }
}

pub async fn list_servers(file: &Path) -> LauncherResult<Vec<ServerEntry>> {
    let document = load(file).await?;
    let Some(Tag::List(_, items)) = document
        .root
        .as_compound()
        .and_then(|root| root.get(SERVERS_KEY))
    else {
        return Ok(Vec::new());
    };
    Ok(items
        .iter()
        .filter_map(Tag::as_compound)
        .map(|entry| ServerEntry {
            name: entry.get("name").and_then(Tag::as_str).unwrap_or_default(),
            ip: entry.get("ip").and_then(Tag::as_str).unwrap_or_default(),
            accept_textures: match entry.get("acceptTextures") {
                Some(Tag::Byte(b)) => Some(*b != 0),
                _ => None,
            },
        })
        .collect())
}

/// Add `host` to the server list in `file`, or refresh the existing entry.
///
/// Hosts match case-insensitively, with the default port filled in. Every
/// other entry, and every field we don't set, is written back unchanged.
/// With `auto_connect` the entry also accepts server resource packs, so
/// joining on start-up doesn't stop at the prompt.
pub async fn upsert_server(
    file: &Path,
    host: &str,
    display_name: &str,
    auto_connect: bool,
) -> LauncherResult<UpsertOutcome> {
    let host = host.trim();
    if host.is_empty() {
        return Err(LauncherError::Other("server host is empty".into()));
    }
    let display_name = match display_name.trim() {
        "" => host,
        name => name,
    };

    let mut document = load(file).await?;
    let Tag::Compound(root) = &mut document.root else {
        return Err(LauncherError::Nbt(format!(
            "{:?}: root is not a compound",
            file
        )));
    };

    if root.get(SERVERS_KEY).is_none() {
        root.set(SERVERS_KEY, Tag::List(COMPOUND_ID, Vec::new()));
    }
    let Some(Tag::List(element, items)) = root.get_mut(SERVERS_KEY) else {
        return Err(LauncherError::Nbt(format!("{:?}: 'servers' is not a list", file)));
    };
    if items.is_empty() {
        *element = COMPOUND_ID;
    } else if *element != COMPOUND_ID {
        return Err(LauncherError::Nbt(format!(
            "{:?}: 'servers' holds tag type {}",
            file, element
        )));
    }

    let existing = items.iter_mut().find_map(|item| match item {
        Tag::Compound(entry)
            if entry
                .get("ip")
                .and_then(Tag::as_str)
                .is_some_and(|ip| same_server(&ip, host)) =>
        {
            Some(entry)
        }
        _ => None,
    });

    let outcome = match existing {
        Some(entry) => {
            let mut changed = entry.set("name", Tag::string(display_name));
            if auto_connect {
                changed |= entry.set("acceptTextures", Tag::Byte(1));
            }
            if changed {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Unchanged
            }
        }
        None => {
            let mut entry = Compound::new();
            entry.set("name", Tag::string(display_name));
            entry.set("ip", Tag::string(host));
            if auto_connect {
                entry.set("acceptTextures", Tag::Byte(1));
            }
            items.push(Tag::Compound(entry));
            UpsertOutcome::Added
        }
    };

    if outcome == UpsertOutcome::Unchanged {
        debug!("Server {} already listed in {:?}", host, file);
        return Ok(outcome);
    }
    write_atomic(file, &document.encode()?).await?;
    info!("Server list {:?}: {:?} {}", file, outcome, host);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::servers::nbt::MString;
    use crate::core::test_support::scratch_dir;

    fn entry(name: &str, ip: &str, extra: Option<(&str, Tag)>) -> Tag {
        let mut c = Compound::new();
        c.set("name", Tag::string(name));
        c.set("ip", Tag::string(ip));
        if let Some((k, v)) = extra {
            c.set(k, v);
        }
        Tag::Compound(c)
    }

    fn seed(file: &Path) -> Vec<u8> {
        let mut root = Compound::new();
        root.set(
            SERVERS_KEY,
            Tag::List(
                COMPOUND_ID,
                vec![
                    entry("Hub", "hub.example.org", Some(("icon", Tag::string("AAAA")))),
                    entry("Old name", "Play.Example.net:25565", Some(("hidden", Tag::Byte(0)))),
                ],
            ),
        );
        let doc = NbtDocument {
            name: MString::default(),
            root: Tag::Compound(root),
        };
        let bytes = doc.encode().unwrap();
        std::fs::write(file, &bytes).unwrap();
        bytes
    }

    #[tokio::test]
    async fn second_upsert_updates_in_place() {
        let dir = scratch_dir("servers-upsert");
        let file = dir.join("servers.dat");
        seed(&file);

        let first = upsert_server(&file, "play.example.net", "Example SMP", true).await.unwrap();
        assert_eq!(first, UpsertOutcome::Updated);
        let second = upsert_server(&file, "play.example.net", "Example SMP", true).await.unwrap();
        assert_eq!(second, UpsertOutcome::Unchanged);

        let servers = list_servers(&file).await.unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "Hub");
        assert_eq!(servers[1].name, "Example SMP");
        assert_eq!(servers[1].ip, "Play.Example.net:25565");
        assert_eq!(servers[1].accept_textures, Some(true));

        // The untouched entry keeps its extra field and order.
        let doc = NbtDocument::decode(&std::fs::read(&file).unwrap()).unwrap();
        let Some(Tag::List(_, items)) = doc.root.as_compound().unwrap().get(SERVERS_KEY) else {
            panic!("missing servers");
        };
        assert_eq!(items[0], entry("Hub", "hub.example.org", Some(("icon", Tag::string("AAAA")))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn new_hosts_are_appended_and_missing_files_created() {
        let dir = scratch_dir("servers-append");
        let file = dir.join("servers.dat");

        let outcome = upsert_server(&file, "mc.example.com:25570", "", false).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Added);
        let servers = list_servers(&file).await.unwrap();
        assert_eq!(
            servers,
            vec![ServerEntry {
                name: "mc.example.com:25570".into(),
                ip: "mc.example.com:25570".into(),
                accept_textures: None,
            }]
        );

        // Different port, different server.
        upsert_server(&file, "mc.example.com", "Default port", false).await.unwrap();
        assert_eq!(list_servers(&file).await.unwrap().len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unchanged_upsert_leaves_the_file_untouched() {
        let dir = scratch_dir("servers-bytes");
        let file = dir.join("servers.dat");
        let original = seed(&file);

        let outcome = upsert_server(&file, "hub.example.org:25565", "Hub", false).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(std::fs::read(&file).unwrap(), original);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
