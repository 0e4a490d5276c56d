pub mod class_format_check {
    use std::error::Error;
    use std::fmt::Display;

    #[derive(Debug)]
    pub enum FormatCause {
        IncorrectMagic(u32),
        ExtraBytes,
        TruncatedBlob,
        InvalidIndex(u16),
        InvalidDescriptor(String),
        UnresolvedEntry(u16),
    }

    impl Display for FormatCause {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                FormatCause::IncorrectMagic(m) => write!(f, "IncorrectMagic: {:#02X?}", m),
                FormatCause::ExtraBytes => write!(f, "ExtraBytes"),
                FormatCause::TruncatedBlob => write!(f, "TruncatedBlob"),
                FormatCause::InvalidIndex(index) => write!(f, "InvalidIndex: {index}"),
                FormatCause::InvalidDescriptor(desc) => write!(f, "InvalidDescriptor: {desc}"),
                FormatCause::UnresolvedEntry(index) => write!(f, "UnresolvedEntry: {index}"),
            }
        }
    }

    #[derive(Debug)]
    pub struct FormatError {
        cause: FormatCause,
        msg: String,
    }

    impl FormatError {
        pub fn new(cause: FormatCause, msg: &str) -> FormatError {
            FormatError {
                cause,
                msg: msg.into(),
            }
        }

        pub fn cause(&self) -> &FormatCause {
            &self.cause
        }
    }

    impl Error for FormatError {}

    impl Display for FormatError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "Format Error: {}, {}", self.cause, self.msg)
        }
    }
}

pub mod class_loading {
    use std::error::Error;
    use std::fmt::Display;

    #[derive(Debug)]
    pub enum LoadingCause {
        InvalidConstantTag(u8),
        InvalidAttributeNameIndex(u16),
        UnexpectedEndOfData,
    }

    impl Display for LoadingCause {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                LoadingCause::InvalidConstantTag(t) => write!(f, "InvalidConstantTag: {t}"),
                LoadingCause::InvalidAttributeNameIndex(i) => {
                    write!(f, "InvalidAttributeNameIndex: {i}")
                }
                LoadingCause::UnexpectedEndOfData => write!(f, "UnexpectedEndOfData"),
            }
        }
    }

    #[derive(Debug)]
    pub struct LoadingError {
        cause: LoadingCause,
        msg: String,
    }

    impl LoadingError {
        pub fn new(cause: LoadingCause, msg: &str) -> LoadingError {
            LoadingError {
                cause,
                msg: msg.into(),
            }
        }

        pub fn cause(&self) -> &LoadingCause {
            &self.cause
        }
    }

    impl Error for LoadingError {}

    impl Display for LoadingError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "Loading Error: {}, {}", self.cause, self.msg)
        }
    }
}
