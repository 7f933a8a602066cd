use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use crate::entry::Entry;
use crate::error::prelude::*;
use crate::header::Header;
use crate::java::header::JavaHeader;
use crate::java::JavaClass;
use crate::message::Event;
use crate::resources::binary::Binary;
use crate::resources::bitmap::Bitmap;
use crate::resources::font::Font;
use crate::resources::string::StringResource;
use crate::resources::wave::Wave;
use crate::script::LinkerScript;

pub type EntryCell = Rc<RefCell<dyn Entry>>;

/// Layout bookkeeping parallel to the entry list. Keeping priority and
/// position here lets insertion and re-layout run without borrowing an
/// entry that is currently handling an event.
#[derive(Debug, Clone, Copy)]
struct LayoutSlot {
    priority: u32,
    file_pos: u32,
    length: u32,
}

/// The resource file under construction: the ordered entry list, the
/// factory list, the linker script, the global error state and the file
/// header the chunk table lives in.
pub struct ResourceFile {
    entries: RefCell<Vec<EntryCell>>,
    layout: RefCell<Vec<LayoutSlot>>,
    factories: RefCell<Vec<EntryCell>>,
    java_classes: RefCell<Vec<Rc<RefCell<JavaClass>>>>,
    header: Rc<RefCell<Header>>,
    script: Rc<RefCell<LinkerScript>>,
    error: RefCell<Option<String>>,
    verbose: Cell<bool>,
}

impl ResourceFile {
    pub fn new() -> ResourceFile {
        let file = ResourceFile {
            entries: RefCell::new(Vec::new()),
            layout: RefCell::new(Vec::new()),
            factories: RefCell::new(Vec::new()),
            java_classes: RefCell::new(Vec::new()),
            header: Rc::new(RefCell::new(Header::new())),
            script: Rc::new(RefCell::new(LinkerScript::new())),
            error: RefCell::new(None),
            verbose: Cell::new(false),
        };
        file.add(file.header.clone());
        file.add_factory(file.script.clone());
        file
    }

    /// Registers the command-line factories for every resource type.
    pub fn register_factories(&self) {
        self.add_factory(Rc::new(RefCell::new(JavaClass::new())));
        self.add_factory(Rc::new(RefCell::new(Wave::new())));
        self.add_factory(Rc::new(RefCell::new(Bitmap::new())));
        self.add_factory(Rc::new(RefCell::new(Font::new())));
        self.add_factory(Rc::new(RefCell::new(StringResource::new())));
        self.add_factory(Rc::new(RefCell::new(Binary::new())));
    }

    /// Inserts an entry at the last position among its priority class and
    /// returns its index.
    pub fn add(&self, entry: EntryCell) -> usize {
        let priority = entry.borrow().priority();
        let mut layout = self.layout.borrow_mut();
        let mut index = 0;
        while index < layout.len() && layout[index].priority <= priority {
            index += 1;
        }
        layout.insert(
            index,
            LayoutSlot {
                priority,
                file_pos: 0,
                length: 0,
            },
        );
        self.entries.borrow_mut().insert(index, entry);
        index
    }

    pub fn add_factory(&self, factory: EntryCell) {
        self.factories.borrow_mut().push(factory);
    }

    pub fn add_java_class(&self, class: Rc<RefCell<JavaClass>>) -> usize {
        self.java_classes.borrow_mut().push(class.clone());
        self.add(class)
    }

    pub fn script(&self) -> Rc<RefCell<LinkerScript>> {
        self.script.clone()
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.set(verbose);
    }

    pub fn verbose(&self) -> bool {
        self.verbose.get()
    }

    pub fn set_error(&self, error: BuildError) {
        self.set_error_message(error.to_string());
    }

    pub fn set_error_message(&self, message: String) {
        *self.error.borrow_mut() = Some(message);
    }

    pub fn is_error(&self) -> bool {
        self.error.borrow().is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    /// Routes a chunk registration to the file header. Registering an id a
    /// second time is a no-op.
    pub fn register_chunk(&self, id: u32, priority: u32, entry: EntryCell) {
        self.header.borrow_mut().register(id, priority, entry);
    }

    /// Broadcasts an event over the entry list. The index bound is
    /// re-checked every step, so entries added behind the cursor during the
    /// pass still receive the event.
    pub fn broadcast(&self, event: &mut Event) {
        let mut index = 0;
        loop {
            let entry = match self.entries.borrow().get(index) {
                Some(entry) => entry.clone(),
                None => break,
            };
            self.deliver(index, &entry, event);
            index += 1;
        }
    }

    pub fn broadcast_factory(&self, event: &mut Event) {
        let factories: Vec<EntryCell> = self.factories.borrow().clone();
        for factory in factories {
            factory.borrow_mut().on_event(self, event);
        }
    }

    /// Delivers one event. For Prepare, the handler sizes its buffer first
    /// and only then does the entry get its absolute position and does the
    /// running counter advance.
    fn deliver(&self, index: usize, entry: &EntryCell, event: &mut Event) {
        entry.borrow_mut().on_event(self, event);
        if let Event::Prepare { file_pos } = event {
            let mut entry = entry.borrow_mut();
            let length = entry.info().buffer().len() as u32;
            entry.info_mut().set_file_pos(*file_pos);
            let mut layout = self.layout.borrow_mut();
            layout[index].file_pos = *file_pos;
            layout[index].length = length;
            *file_pos += length;
        }
    }

    /// Total size of the serialized file.
    pub fn binary_size(&self) -> u32 {
        self.layout.borrow().iter().map(|slot| slot.length).sum()
    }

    /// Snapshot of every entry buffer in file order.
    pub fn buffers(&self) -> Vec<Vec<u8>> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|entry| entry.try_borrow().ok())
            .map(|entry| entry.info().buffer().as_slice().to_vec())
            .collect()
    }

    /// True when an entry of the given class id was already loaded from
    /// `name`.
    pub fn source_exists(&self, class_id: u32, name: &str) -> bool {
        self.entries.borrow().iter().any(|entry| match entry.try_borrow() {
            Ok(entry) => {
                entry.info().class_id() == class_id && entry.source_name() == Some(name)
            }
            Err(_) => false,
        })
    }

    /// Fails (and records the error) when a non-empty identifier is already
    /// taken by any entry.
    pub fn check_identifier(&self, identifier: &str) -> bool {
        if identifier.is_empty() {
            return true;
        }
        let taken = self.entries.borrow().iter().any(|entry| {
            match entry.try_borrow() {
                Ok(entry) => entry.identifier() == Some(identifier),
                Err(_) => false,
            }
        });
        if taken {
            self.set_error(BuildError::DuplicateIdentifier(identifier.to_string()));
            return false;
        }
        true
    }

    pub fn find_java_class(&self, name: &str) -> Option<Rc<RefCell<JavaClass>>> {
        for class in self.java_classes.borrow().iter() {
            if let Ok(borrowed) = class.try_borrow() {
                if borrowed.this_class_name() == Some(name) {
                    return Some(class.clone());
                }
            }
        }
        None
    }

    /// Loads and parses a java class pulled in as a dependency during
    /// Link, inserts it and re-runs the sizing pass from the insertion
    /// point on. The class driving the current link step sits in front of
    /// the insertion point, so its position never moves; entries behind it
    /// recompute any offset-dependent sizing at their shifted positions.
    pub fn load_java_dependency(
        &self,
        path: &Path,
        java_header: Option<Rc<RefCell<JavaHeader>>>,
    ) -> BuildResult<Rc<RefCell<JavaClass>>> {
        let mut class = JavaClass::new();
        class.load(path)?;
        class.parse()?;
        if let Some(header) = java_header {
            class.set_java_header(header);
        }
        let class = Rc::new(RefCell::new(class));
        let index = self.add_java_class(class.clone());
        self.prepare_from(index);
        Ok(class)
    }

    fn prepare_from(&self, index: usize) {
        let file_pos = self.layout.borrow()[..index]
            .iter()
            .map(|slot| slot.length)
            .sum();
        let mut event = Event::Prepare { file_pos };
        let mut cursor = index;
        loop {
            let entry = match self.entries.borrow().get(cursor) {
                Some(entry) => entry.clone(),
                None => break,
            };
            self.deliver(cursor, &entry, &mut event);
            cursor += 1;
        }
    }
}

impl Default for ResourceFile {
    fn default() -> ResourceFile {
        ResourceFile::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::EntryInfo;

    struct Probe {
        info: EntryInfo,
        priority: u32,
        size: usize,
        identifier: Option<String>,
        spawn: Option<Rc<RefCell<Probe>>>,
        linked: bool,
    }

    impl Probe {
        fn new(priority: u32, size: usize) -> Probe {
            Probe {
                info: EntryInfo::new(0x54534554, "probe"),
                priority,
                size,
                identifier: None,
                spawn: None,
                linked: false,
            }
        }
    }

    impl Entry for Probe {
        fn info(&self) -> &EntryInfo {
            &self.info
        }

        fn info_mut(&mut self) -> &mut EntryInfo {
            &mut self.info
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn identifier(&self) -> Option<&str> {
            self.identifier.as_deref()
        }

        fn on_event(&mut self, file: &ResourceFile, event: &mut Event) {
            match event {
                Event::Prepare { .. } => self.info.buffer_mut().set_len(self.size),
                Event::Link => {
                    self.linked = true;
                    if let Some(spawn) = self.spawn.take() {
                        file.add(spawn);
                    }
                }
                _ => {}
            }
        }
    }

    #[test]
    fn priority_stable_ordering() {
        let file = ResourceFile::new();
        let late = Rc::new(RefCell::new(Probe::new(30, 7)));
        let first = Rc::new(RefCell::new(Probe::new(20, 3)));
        let second = Rc::new(RefCell::new(Probe::new(20, 5)));
        file.add(late.clone());
        file.add(first.clone());
        file.add(second.clone());

        file.broadcast(&mut Event::Prepare { file_pos: 0 });

        // header (12 bytes, priority 0) leads, then the two priority-20
        // probes in insertion order, then the priority-30 probe
        assert_eq!(first.borrow().info.file_pos(), 12);
        assert_eq!(second.borrow().info.file_pos(), 15);
        assert_eq!(late.borrow().info.file_pos(), 20);
        assert_eq!(file.binary_size(), 27);
    }

    #[test]
    fn broadcast_reaches_entries_added_during_pass() {
        let file = ResourceFile::new();
        let spawned = Rc::new(RefCell::new(Probe::new(40, 4)));
        let spawner = Rc::new(RefCell::new(Probe::new(20, 2)));
        spawner.borrow_mut().spawn = Some(spawned.clone());
        file.add(spawner);

        file.broadcast(&mut Event::Link);

        assert!(spawned.borrow().linked);
    }

    #[test]
    fn broadcast_skips_entries_added_before_cursor() {
        let file = ResourceFile::new();
        let spawned = Rc::new(RefCell::new(Probe::new(5, 4)));
        let spawner = Rc::new(RefCell::new(Probe::new(40, 2)));
        spawner.borrow_mut().spawn = Some(spawned.clone());
        file.add(spawner);

        file.broadcast(&mut Event::Link);

        // inserted in front of the cursor, not revisited
        assert!(!spawned.borrow().linked);
    }

    #[test]
    fn duplicate_identifier_sets_error() {
        let file = ResourceFile::new();
        let mut probe = Probe::new(20, 0);
        probe.identifier = Some(String::from("logo"));
        file.add(Rc::new(RefCell::new(probe)));

        assert!(file.check_identifier("title"));
        assert!(!file.is_error());
        assert!(!file.check_identifier("logo"));
        assert_eq!(
            file.error_message(),
            Some(String::from("Resource identifier already exists. (logo)"))
        );
    }

    #[test]
    fn empty_identifier_is_always_free() {
        let file = ResourceFile::new();
        assert!(file.check_identifier(""));
        assert!(file.check_identifier(""));
        assert!(!file.is_error());
    }

    #[test]
    fn source_exists_matches_class_and_name() {
        let file = ResourceFile::new();
        let probe = Rc::new(RefCell::new(Probe::new(20, 0)));
        file.add(probe);
        // Probe reports no source name
        assert!(!file.source_exists(0x54534554, "beep.wav"));
    }
}
