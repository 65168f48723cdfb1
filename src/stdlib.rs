//! Built-in native modules, installed by bare-name imports.
//!
//! `outstream` provides `print`/`println`/`printf`; `filestream` provides a
//! `File` record type with `fopen`/`fclose`/`fwrite`/`fread`, keeping the
//! host file handle in a hidden field.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use crate::env::EnvRef;
use crate::error::{LumError, LumResult};
use crate::value::{BaseType, LumFunction, StructInstance, StructType, TypeDesc, Value};

/// Install a built-in module into the importing environment.
pub fn install(name: &str, env: &EnvRef) -> LumResult<()> {
    match name {
        "outstream" => {
            add_outstream(env);
            Ok(())
        }
        "filestream" => {
            add_filestream(env);
            Ok(())
        }
        _ => Err(LumError::module(format!("Unknown module: {name}"))),
    }
}

fn add_outstream(env: &EnvRef) {
    let mut env = env.borrow_mut();

    env.set(
        "print",
        LumFunction::new(|_exec, args| {
            let mut out = std::io::stdout().lock();
            for arg in &args {
                write!(out, "{arg}")?;
            }
            out.flush()?;
            Ok(Value::Int(0))
        }),
    );

    env.set(
        "println",
        LumFunction::new(|_exec, args| {
            let mut out = std::io::stdout().lock();
            for arg in &args {
                write!(out, "{arg}")?;
            }
            writeln!(out)?;
            Ok(Value::Int(0))
        }),
    );

    // `printf("{} and {}", a, b)` substitutes string arguments in order.
    env.set(
        "printf",
        LumFunction::new(|_exec, args| {
            let Some(first) = args.first() else {
                return Ok(Value::Int(0));
            };
            let mut format = first.as_str()?.to_string();
            let mut arg_index = 1;
            let mut pos = 0;
            while let Some(found) = format[pos..].find("{}") {
                if arg_index >= args.len() {
                    break;
                }
                let at = pos + found;
                let replacement = args[arg_index].as_str()?.to_string();
                format.replace_range(at..at + 2, &replacement);
                pos = at + replacement.len();
                arg_index += 1;
            }
            let mut out = std::io::stdout().lock();
            write!(out, "{format}")?;
            out.flush()?;
            Ok(Value::Int(0))
        }),
    );
}

type FileHandle = Rc<RefCell<File>>;

fn add_filestream(env: &EnvRef) {
    let file_type = Rc::new(StructType {
        name: "File".to_string(),
        fields: vec![
            ("filename".to_string(), TypeDesc::base(BaseType::String)),
            ("size".to_string(), TypeDesc::base(BaseType::Int)),
            ("is_open".to_string(), TypeDesc::base(BaseType::Bool)),
        ],
    });
    env.borrow_mut().set_type("File", file_type.clone());

    let ft = file_type;
    env.borrow_mut().set(
        "fopen",
        LumFunction::new(move |_exec, args| {
            if args.len() < 2 {
                return Err(LumError::runtime("fopen requires a filename and a mode"));
            }
            let filename = args[0].as_str()?.to_string();
            let mode = args[1].as_str()?;

            let file = match mode {
                "r" => File::open(&filename),
                "w" => File::create(&filename),
                "a" => OpenOptions::new().append(true).create(true).open(&filename),
                other => return Err(LumError::runtime(format!("Invalid file mode: {other}"))),
            }
            .map_err(|e| LumError::runtime(format!("Failed to open file: {filename} ({e})")))?;

            let mut instance = StructInstance::new("File", ft.clone());
            instance.add_field("filename", Value::Str(filename));
            instance.add_field("size", Value::Int(0));
            instance.add_field("is_open", Value::Bool(true));
            let handle: FileHandle = Rc::new(RefCell::new(file));
            instance.set_hidden("stream", Box::new(handle));

            Ok(Value::Struct(Rc::new(RefCell::new(instance))))
        }),
    );

    env.borrow_mut().set(
        "fclose",
        LumFunction::new(|_exec, args| {
            let file = file_arg(&args, "fclose")?;
            // Dropping the handle closes the descriptor.
            file.borrow_mut().take_hidden("stream");
            file.borrow_mut().set_field("is_open", Value::Bool(false))?;
            Ok(Value::Int(0))
        }),
    );

    env.borrow_mut().set(
        "fwrite",
        LumFunction::new(|_exec, args| {
            if args.len() < 2 {
                return Err(LumError::runtime("fwrite requires a File struct and a string"));
            }
            let file = file_arg(&args, "fwrite")?;
            let data = args[1].as_str()?.to_string();
            let stream = open_stream(&file, "fwrite")?;

            let size = {
                let mut s = stream.borrow_mut();
                s.write_all(data.as_bytes())?;
                s.flush()?;
                s.seek(SeekFrom::End(0))? as i64
            };
            file.borrow_mut().set_field("size", Value::Int(size))?;
            Ok(Value::Int(0))
        }),
    );

    env.borrow_mut().set(
        "fread",
        LumFunction::new(|_exec, args| {
            let file = file_arg(&args, "fread")?;
            let stream = open_stream(&file, "fread")?;
            let mut s = stream.borrow_mut();
            s.seek(SeekFrom::Start(0))?;

            match args.get(1) {
                Some(count) => {
                    let count = usize::try_from(count.as_int()?)
                        .map_err(|_| LumError::runtime("fread expects a positive length"))?;
                    let mut buf = vec![0u8; count];
                    let read = s.read(&mut buf)?;
                    buf.truncate(read);
                    Ok(Value::Str(String::from_utf8_lossy(&buf).into_owned()))
                }
                None => {
                    let mut content = String::new();
                    s.read_to_string(&mut content)?;
                    Ok(Value::Str(content))
                }
            }
        }),
    );
}

fn file_arg(args: &[Value], who: &str) -> LumResult<Rc<RefCell<StructInstance>>> {
    let arg = args
        .first()
        .ok_or_else(|| LumError::runtime(format!("{who} requires a File struct")))?;
    let instance = arg
        .as_struct()
        .map_err(|_| LumError::type_error(format!("{who} expects a File struct")))?;
    if instance.borrow().name != "File" {
        return Err(LumError::type_error(format!("{who} expects a File struct")));
    }
    Ok(instance)
}

fn open_stream(file: &Rc<RefCell<StructInstance>>, who: &str) -> LumResult<FileHandle> {
    let instance = file.borrow();
    instance
        .hidden("stream")
        .and_then(|any| any.downcast_ref::<FileHandle>())
        .cloned()
        .ok_or_else(|| LumError::runtime(format!("{who}: file is not open")))
}

#[cfg(test)]
mod tests {
    use crate::error::LumError;
    use crate::executor::Executor;
    use crate::parser::parse_program;
    use crate::value::Value;
    use std::fs;

    fn run(source: &str) -> crate::error::LumResult<Value> {
        let program = parse_program(source, "test.lum")?;
        Executor::new(program).run()
    }

    #[test]
    fn outstream_functions_are_installed() {
        assert!(run(
            "import \"outstream\";
             fin main() {
                 print(\"value: \", 1, true, nil);
                 println([1, 2, 3]);
                 printf(\"{} and {}\", \"a\", \"b\");
             }"
        )
        .is_ok());
    }

    #[test]
    fn print_returns_int_zero() {
        let v = run("import \"outstream\"; fin int main() { return print(\"\"); }").unwrap();
        assert_eq!(v.as_int().unwrap(), 0);
    }

    #[test]
    fn printf_requires_string_arguments() {
        assert!(matches!(
            run("import \"outstream\"; fin main() { printf(\"{}\", 1); }"),
            Err(LumError::Type { .. })
        ));
    }

    #[test]
    fn filestream_write_then_read() {
        let path = std::env::temp_dir().join(format!("lum-fs-{}.txt", std::process::id()));
        let path_str = path.to_str().unwrap();

        let source = format!(
            "import \"filestream\";
             fin string main() {{
                 File f = fopen(\"{path_str}\", \"w\");
                 fwrite(f, \"hello lum\");
                 fclose(f);
                 File g = fopen(\"{path_str}\", \"r\");
                 string content = fread(g);
                 fclose(g);
                 return content;
             }}"
        );
        let v = run(&source).unwrap();
        assert_eq!(v.as_str().unwrap(), "hello lum");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn fwrite_updates_size_field() {
        let path = std::env::temp_dir().join(format!("lum-fs-size-{}.txt", std::process::id()));
        let path_str = path.to_str().unwrap();

        let source = format!(
            "import \"filestream\";
             fin int main() {{
                 File f = fopen(\"{path_str}\", \"w\");
                 fwrite(f, \"12345\");
                 int n = f.size;
                 fclose(f);
                 return n;
             }}"
        );
        assert_eq!(run(&source).unwrap().as_int().unwrap(), 5);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_mode_and_closed_file_are_fatal() {
        let path = std::env::temp_dir().join(format!("lum-fs-mode-{}.txt", std::process::id()));
        let path_str = path.to_str().unwrap();

        assert!(matches!(
            run(&format!(
                "import \"filestream\";
                 fin main() {{ File f = fopen(\"{path_str}\", \"x\"); }}"
            )),
            Err(LumError::Runtime { .. })
        ));

        assert!(matches!(
            run(&format!(
                "import \"filestream\";
                 fin main() {{
                     File f = fopen(\"{path_str}\", \"w\");
                     fclose(f);
                     fwrite(f, \"late\");
                 }}"
            )),
            Err(LumError::Runtime { .. })
        ));
        let _ = fs::remove_file(&path);
    }
}
