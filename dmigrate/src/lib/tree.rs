//! In-memory model of a Drive folder hierarchy.
//!
//! A [`Tree`] is an arena of [`Entry`] addressed by [`NodeId`]. The root is always
//! [`NodeId::ROOT`]. Each folder indexes its children by name (duplicates allowed,
//! Drive permits them) and by identifier (unique within one folder).

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::drive::{
    id::{Id, IdBuf},
    RemoteFile,
};

/// Separator of the path key. Drive names never contain a new line.
pub const PATH_KEY_SEP: char = '\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Folder,
    File,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Folder => f.write_str("folder"),
            Kind::File => f.write_str("file"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MigrationState {
    #[default]
    Unevaluated,
    FileNeedsMigration,
    FileAlreadyMigrated,
    FolderNeedsCreation,
    FolderAlreadyCreated,
}

impl MigrationState {
    /// State of an entry that has no counterpart at the destination
    pub fn needs_work(kind: Kind) -> Self {
        match kind {
            Kind::Folder => Self::FolderNeedsCreation,
            Kind::File => Self::FileNeedsMigration,
        }
    }

    /// State of an entry matched with a destination entry
    pub fn already_done(kind: Kind) -> Self {
        match kind {
            Kind::Folder => Self::FolderAlreadyCreated,
            Kind::File => Self::FileAlreadyMigrated,
        }
    }

    /// The kind of entry this state applies to
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Self::Unevaluated => None,
            Self::FileNeedsMigration | Self::FileAlreadyMigrated => Some(Kind::File),
            Self::FolderNeedsCreation | Self::FolderAlreadyCreated => Some(Kind::Folder),
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unevaluated => "unevaluated",
            Self::FileNeedsMigration => "file needs migration",
            Self::FileAlreadyMigrated => "file already migrated",
            Self::FolderNeedsCreation => "folder needs creation",
            Self::FolderAlreadyCreated => "folder already created",
        };
        f.write_str(s)
    }
}

/// Link from a source entry to its entry in the destination tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Counterpart {
    #[default]
    Unlinked,
    LinkedTo(NodeId),
}

impl Counterpart {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Unlinked => None,
            Self::LinkedTo(node) => Some(*node),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    id: IdBuf,
    name: String,
    mime_type: String,
    web_view_link: Option<String>,
    parents: Vec<IdBuf>,
    kind: Kind,
    owner: Option<NodeId>,
    traverse: bool,
    state: MigrationState,
    counterpart: Counterpart,
    children_by_name: BTreeMap<String, Vec<NodeId>>,
    children_by_id: HashMap<IdBuf, NodeId>,
}

impl Entry {
    fn new(file: RemoteFile, owner: Option<NodeId>) -> Self {
        let kind = if file.is_folder() {
            Kind::Folder
        } else {
            Kind::File
        };
        Self {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            web_view_link: file.web_view_link,
            parents: file.parents,
            kind,
            owner,
            traverse: false,
            state: MigrationState::Unevaluated,
            counterpart: Counterpart::Unlinked,
            children_by_name: BTreeMap::new(),
            children_by_id: HashMap::new(),
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn web_view_link(&self) -> Option<&str> {
        self.web_view_link.as_deref()
    }

    /// Every parent reported by the remote API
    pub fn parents(&self) -> &[IdBuf] {
        &self.parents
    }

    pub fn is_multi_parent(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == Kind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == Kind::File
    }

    /// The folder this entry was listed in, `None` for the root
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn traverse(&self) -> bool {
        self.traverse
    }

    pub fn set_traverse(&mut self, traverse: bool) {
        self.traverse = traverse;
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn set_state(&mut self, state: MigrationState) -> dmig::Result<()> {
        match state.kind() {
            Some(kind) if kind == self.kind => {
                self.state = state;
                Ok(())
            }
            _ => dmig::bug_bail!(
                "can't set state '{state}' on {} '{}' ({})",
                self.kind,
                self.name,
                self.id
            ),
        }
    }

    pub fn counterpart(&self) -> Counterpart {
        self.counterpart
    }

    /// Links this entry to `target` in the destination tree.
    /// A link is set once; linking again to the same target is a no-op.
    pub fn link(&mut self, target: NodeId) -> dmig::Result<()> {
        match self.counterpart {
            Counterpart::Unlinked => {
                self.counterpart = Counterpart::LinkedTo(target);
                Ok(())
            }
            Counterpart::LinkedTo(node) if node == target => Ok(()),
            Counterpart::LinkedTo(node) => dmig::bug_bail!(
                "'{}' ({}) is linked to {node:?}, can't link it to {target:?}",
                self.name,
                self.id
            ),
        }
    }

    /// Children grouped by name, in name order
    pub fn children_by_name(&self) -> &BTreeMap<String, Vec<NodeId>> {
        &self.children_by_name
    }

    pub fn child_by_id(&self, id: &Id) -> Option<NodeId> {
        self.children_by_id.get(id).copied()
    }

    pub fn children_named(&self, name: &str) -> &[NodeId] {
        self.children_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Entry>,
}

impl Tree {
    /// Creates a tree from its root folder.
    /// The root is always traversed and is its own hierarchy start,
    /// regardless of the parents the API reports.
    pub fn new(root: RemoteFile) -> dmig::Result<Self> {
        if !root.is_folder() {
            dmig::structure_bail!(
                "'{}' ({}) is a {}, expected a folder",
                root.name,
                root.id,
                root.mime_type
            );
        }
        let mut root = Entry::new(root, None);
        root.traverse = true;
        Ok(Self { nodes: vec![root] })
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn get(&self, node: NodeId) -> &Entry {
        &self.nodes[node.0]
    }

    pub fn get_mut(&mut self, node: NodeId) -> &mut Entry {
        &mut self.nodes[node.0]
    }

    /// All the nodes of the tree, in allocation order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Entry)> {
        self.nodes.iter().enumerate().map(|(i, e)| (NodeId(i), e))
    }

    /// Adds `file` as a child of `parent` and indexes it.
    /// Fails if `parent` already has a child with the same identifier.
    pub fn attach(&mut self, parent: NodeId, file: RemoteFile) -> dmig::Result<NodeId> {
        let node = NodeId(self.nodes.len());
        let parent_entry = &mut self.nodes[parent.0];
        if !parent_entry.is_folder() {
            dmig::bug_bail!(
                "can't attach '{}' under file '{}'",
                file.name,
                parent_entry.name
            );
        }
        if parent_entry.children_by_id.contains_key(&file.id) {
            dmig::structure_bail!(
                "folder '{}' ({}) lists identifier {} more than once",
                parent_entry.name,
                parent_entry.id,
                file.id
            );
        }
        parent_entry.children_by_id.insert(file.id.clone(), node);
        parent_entry
            .children_by_name
            .entry(file.name.clone())
            .or_default()
            .push(node);
        self.nodes.push(Entry::new(file, Some(parent)));
        Ok(node)
    }

    /// Children of `folder`, by name then listing order
    pub fn children(&self, folder: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.get(folder)
            .children_by_name
            .values()
            .flat_map(|nodes| nodes.iter().copied())
    }

    /// Names from the root (excluded) down to `node` (included)
    pub fn path(&self, node: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut cur = node;
        while let Some(owner) = self.get(cur).owner {
            names.push(self.get(cur).name());
            cur = owner;
        }
        names.reverse();
        names
    }

    /// Lossless string form of the path, used as lookup key
    pub fn path_key(&self, node: NodeId) -> String {
        self.path(node).join(&PATH_KEY_SEP.to_string())
    }

    /// Path for humans, starting at the root name
    pub fn display_path(&self, node: NodeId) -> String {
        let mut path = self.get(NodeId::ROOT).name().to_string();
        for name in self.path(node) {
            path.push('/');
            path.push_str(name);
        }
        path
    }
}
