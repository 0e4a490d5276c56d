pub mod access_flags;
/// [Attributes](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=123)
pub mod attributes;
/// [Class File Format](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=69)
pub mod class_file;
/// [Constants](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=87)
pub mod constants;
/// [Descriptors](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=104)
pub mod descriptors;
pub mod errors;
