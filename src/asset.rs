use uuid::Uuid;

use crate::raw::descriptors::EbxImportReference;
use crate::value::Instance;

/// Sink for a finished parse. Readers construct one per `read_asset` call,
/// hand over the decoded state, then signal completion.
pub trait EbxReadTarget: Default {
	fn populate(
		&mut self,
		file_guid: Uuid,
		objects: Vec<Instance>,
		ref_counts: Vec<u32>,
		imports: Vec<EbxImportReference>,
	);

	fn on_load_complete(&mut self) {}
}

/// A loaded EBX asset: partition identity, the ordered instance vector,
/// per-instance reference counts, the imports the graph references, and the
/// dependency file GUIDs derived from them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EbxAsset {
	file_guid: Uuid,
	objects: Vec<Instance>,
	ref_counts: Vec<u32>,
	imports: Vec<EbxImportReference>,
	dependencies: Vec<Uuid>,
}

impl EbxAsset {
	pub fn new(file_guid: Uuid, objects: Vec<Instance>) -> Self {
		let ref_counts = vec![0; objects.len()];
		Self {
			file_guid,
			objects,
			ref_counts,
			imports: Vec::new(),
			dependencies: Vec::new(),
		}
	}

	pub fn file_guid(&self) -> Uuid {
		self.file_guid
	}

	pub fn objects(&self) -> &[Instance] {
		&self.objects
	}

	pub fn objects_mut(&mut self) -> &mut [Instance] {
		&mut self.objects
	}

	pub fn into_objects(self) -> Vec<Instance> {
		self.objects
	}

	/// The primary instance of the asset.
	pub fn root_object(&self) -> Option<&Instance> {
		self.objects.first()
	}

	pub fn ref_counts(&self) -> &[u32] {
		&self.ref_counts
	}

	pub fn imports(&self) -> &[EbxImportReference] {
		&self.imports
	}

	pub fn dependencies(&self) -> &[Uuid] {
		&self.dependencies
	}
}

impl EbxReadTarget for EbxAsset {
	fn populate(
		&mut self,
		file_guid: Uuid,
		objects: Vec<Instance>,
		ref_counts: Vec<u32>,
		imports: Vec<EbxImportReference>,
	) {
		self.file_guid = file_guid;
		self.objects = objects;
		self.ref_counts = ref_counts;
		self.imports = imports;
	}

	fn on_load_complete(&mut self) {
		self.dependencies.clear();
		for import in &self.imports {
			if !self.dependencies.contains(&import.file_guid) {
				self.dependencies.push(import.file_guid);
			}
		}
	}
}
