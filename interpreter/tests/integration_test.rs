use std::cell::RefCell;
use std::fs::File;
use std::io::Read;
use std::rc::Rc;

use interpreter::Interpreter;
use walkdir::WalkDir;

#[test]
fn test_programs() {
    let source_files = WalkDir::new("../tests")
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| matches!(entry.path().extension(), Some(extension) if extension == "lox"))
        .filter_map(|entry| {
            let mut exp_filename = entry.file_name().to_os_string();
            exp_filename.push(".out");

            let parent = entry.path().parent().unwrap();
            let exp_filepath = parent.join(exp_filename);

            if exp_filepath.exists() {
                Some((entry, exp_filepath))
            } else {
                None
            }
        });

    let mut total = 0;

    for (src_path, exp_path) in source_files {
        println!("🕑 Running test: {}", src_path.path().display());

        let mut src_content = String::new();
        let mut exp_content = String::new();

        File::open(src_path.path())
            .unwrap()
            .read_to_string(&mut src_content)
            .unwrap();
        File::open(exp_path)
            .unwrap()
            .read_to_string(&mut exp_content)
            .unwrap();

        let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());
        let result = interpreter.run(&src_content);

        // Output written before a runtime error is kept, the error follows it.
        let mut actual = String::from(std::str::from_utf8(&output.borrow()).unwrap());
        if let Err(err) = result {
            actual.push_str(&err.to_string());
            actual.push('\n');
        }

        assert_eq!(
            exp_content,
            actual,
            "unexpected output from {}",
            src_path.path().display()
        );

        println!("✅ Test complete: {}", src_path.path().display());
        total += 1;
    }

    assert!(total > 0, "no test scripts found");
    println!("✅ Ran {} tests", total)
}
