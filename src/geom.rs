pub mod contact;
pub mod mesh;
pub mod point;
pub mod triangles;
pub mod vector;
