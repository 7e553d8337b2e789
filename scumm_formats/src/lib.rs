pub mod archive;
pub mod chunk;
pub mod index;
pub mod room;
pub mod wiz;
pub mod wiz_pack;
pub mod wiz_polygon;
pub mod writer;

pub use archive::DataArchive;
pub use chunk::{Chunk, ChunkIter, Tag};
pub use index::{DirEntry, Directory, IndexFile, Maxs, ObjectEntry};
pub use room::{CycleEntry, ObjectCode, RoomData, WalkBox};
pub use wiz::{Canvas, DrawParams, Rect, WizFlags, WizImage, draw_wiz_image, wiz_histogram};
pub use wiz_pack::{capture_wiz_image, pack_type0, pack_type1};
pub use wiz_polygon::{Point, PolygonStore, WizPolygon, draw_wiz_polygon};
pub use writer::GameWriter;
