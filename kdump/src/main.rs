use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use kloader::attributes::AttributeInfo;
use kloader::class_file::ClassFile;
use kloader::constants::ConstantPool;

/// Prints the structure of a parsed class file: constant pool, access
/// flags, members and attribute summaries.
#[derive(Parser)]
#[command(name = "kdump", about = "Inspect a .class file")]
struct Args {
    /// The class file to inspect.
    file: PathBuf,

    /// Print the constant pool.
    #[arg(short = 'p', long)]
    pool: bool,

    /// Print bytecode lengths and exception tables for each method.
    #[arg(short = 'b', long)]
    bytecode: bool,
}

fn describe_constant(constant: &ConstantPool) -> String {
    match constant {
        ConstantPool::Utf8(utf8) => format!("Utf8               {:?}", utf8),
        ConstantPool::Integer(i) => format!("Integer            {}", i.value()),
        ConstantPool::Float(f) => format!("Float              {}", f.value()),
        ConstantPool::Long(l) => format!("Long               {}", l.value()),
        ConstantPool::Double(d) => format!("Double             {}", d.value()),
        ConstantPool::Class(c) => format!(
            "Class              #{} // {}",
            c.name_index,
            c.name.as_deref().unwrap_or("?")
        ),
        ConstantPool::String(s) => format!(
            "String             #{} // {:?}",
            s.string_index,
            s.contents.as_deref().unwrap_or("?")
        ),
        ConstantPool::Fieldref(r) => {
            format!("Fieldref           #{}.#{}", r.class_index, r.name_and_type_index)
        }
        ConstantPool::Methodref(r) => {
            format!("Methodref          #{}.#{}", r.class_index, r.name_and_type_index)
        }
        ConstantPool::InterfaceMethodref(r) => format!(
            "InterfaceMethodref #{}.#{}",
            r.class_index, r.name_and_type_index
        ),
        ConstantPool::NameAndType(nat) => format!(
            "NameAndType        {}:{}",
            nat.name.as_deref().unwrap_or("?"),
            nat.descriptor.as_deref().unwrap_or("?")
        ),
        ConstantPool::MethodHandle(mh) => format!(
            "MethodHandle       kind {} -> #{}",
            mh.reference_kind, mh.reference_index
        ),
        ConstantPool::MethodType(mt) => format!(
            "MethodType         {}",
            mt.descriptor.as_deref().unwrap_or("?")
        ),
        ConstantPool::InvokeDynamic(id) => format!(
            "InvokeDynamic      bootstrap #{} nat #{}",
            id.bootstrap_method_attr_index, id.name_and_type_index
        ),
        ConstantPool::Unknown => "-".to_string(),
    }
}

fn attribute_names(attributes: &[AttributeInfo]) -> Vec<&str> {
    attributes
        .iter()
        .map(|attr| match attr {
            AttributeInfo::Code(_) => "Code",
            AttributeInfo::LineNumberTable(_) => "LineNumberTable",
            AttributeInfo::SourceFile(_) => "SourceFile",
            AttributeInfo::ConstantValue(_) => "ConstantValue",
            AttributeInfo::Exceptions(_) => "Exceptions",
            AttributeInfo::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            AttributeInfo::Unknown(raw) => raw.name.as_str(),
        })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let bytes = std::fs::read(&args.file)?;
    let class = ClassFile::from_bytes(&bytes)?;

    println!("class {}", class.class_name()?);
    println!("  version: {}.{}", class.major_version, class.minor_version);
    println!("  flags:   {:?}", class.access_flags);
    if let Some(super_name) = class.super_class_name()? {
        println!("  super:   {super_name}");
    }
    let interfaces = class.interface_names()?;
    if !interfaces.is_empty() {
        println!("  implements: {}", interfaces.join(", "));
    }
    if let Some(source_file) = class.source_file() {
        println!("  source:  {source_file}");
    }

    if args.pool {
        println!("constant pool ({} entries):", class.constant_pool.len() - 1);
        for (index, constant) in class.constant_pool.iter().enumerate().skip(1) {
            println!("  #{index:<4} {}", describe_constant(constant));
        }
    }

    println!("fields ({}):", class.fields.len());
    for field in &class.fields {
        println!(
            "  {} {} {:?}",
            field.descriptor, field.name, field.access_flags
        );
    }

    println!("methods ({}):", class.methods.len());
    for method in &class.methods {
        println!(
            "  {}{} {:?}",
            method.name, method.descriptor, method.access_flags
        );
        let names = attribute_names(&method.attributes);
        if !names.is_empty() {
            println!("    attributes: {}", names.join(", "));
        }
        if args.bytecode {
            if let Some(code) = method.code() {
                println!(
                    "    code: {} bytes, max_stack {}, max_locals {}",
                    code.code.len(),
                    code.max_stack,
                    code.max_locals
                );
                for entry in &code.exception_table {
                    println!(
                        "    handler: [{}, {}) -> {} catch #{}",
                        entry.start_pc, entry.end_pc, entry.handler_pc, entry.catch_type
                    );
                }
            }
        }
    }
    Ok(())
}
