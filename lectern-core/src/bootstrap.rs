//! Derived syntax and library procedures written in Scheme, evaluated into
//! the top-level environment when a runtime starts.

use log::{debug, warn};

use crate::jit::analysis::internal_defines;
use crate::language::CompileState;
use crate::runtime::Runtime;

// Temporaries introduced by these macros are ordinary identifiers; a use
// site that binds the same name captures them.
const PRELUDE: &str = r#"
;;; Binding forms

(define-syntax let
  (syntax-rules ()
    ((_ ((name val) ...) body1 body2 ...)
     ((lambda (name ...) body1 body2 ...) val ...))
    ((_ tag ((name val) ...) body1 body2 ...)
     ((letrec ((tag (lambda (name ...) body1 body2 ...))) tag) val ...))))

(define-syntax let*
  (syntax-rules ()
    ((_ () body1 body2 ...) (let () body1 body2 ...))
    ((_ ((name val) rest ...) body1 body2 ...)
     (let ((name val)) (let* (rest ...) body1 body2 ...)))))

(define-syntax letrec
  (syntax-rules ()
    ((_ ((name val) ...) body1 body2 ...)
     ((lambda () (define name val) ... body1 body2 ...)))))

(define-syntax letrec*
  (syntax-rules ()
    ((_ ((name val) ...) body1 body2 ...)
     ((lambda () (define name val) ... body1 body2 ...)))))

;;; Conditionals

(define-syntax and
  (syntax-rules ()
    ((_) #t)
    ((_ e) e)
    ((_ e1 e2 ...) (if e1 (and e2 ...) #f))))

(define-syntax or
  (syntax-rules ()
    ((_) #f)
    ((_ e) e)
    ((_ e1 e2 ...) (let ((%or-value e1)) (if %or-value %or-value (or e2 ...))))))

(define-syntax when
  (syntax-rules ()
    ((_ test body1 body2 ...) (if test (begin body1 body2 ...)))))

(define-syntax unless
  (syntax-rules ()
    ((_ test body1 body2 ...) (if test (begin) (begin body1 body2 ...)))))

(define-syntax cond
  (syntax-rules (else =>)
    ((_ (else result1 result2 ...)) (begin result1 result2 ...))
    ((_ (test => receiver))
     (let ((%cond-value test)) (if %cond-value (receiver %cond-value))))
    ((_ (test => receiver) clause1 clause2 ...)
     (let ((%cond-value test))
       (if %cond-value (receiver %cond-value) (cond clause1 clause2 ...))))
    ((_ (test)) test)
    ((_ (test) clause1 clause2 ...)
     (let ((%cond-value test))
       (if %cond-value %cond-value (cond clause1 clause2 ...))))
    ((_ (test result1 result2 ...)) (if test (begin result1 result2 ...)))
    ((_ (test result1 result2 ...) clause1 clause2 ...)
     (if test (begin result1 result2 ...) (cond clause1 clause2 ...)))))

(define-syntax case
  (syntax-rules (else)
    ((_ (head ...) clause1 clause2 ...)
     (let ((%case-key (head ...))) (case %case-key clause1 clause2 ...)))
    ((_ key (else result1 result2 ...)) (begin result1 result2 ...))
    ((_ key ((datum ...) result1 result2 ...))
     (if (memv key '(datum ...)) (begin result1 result2 ...)))
    ((_ key ((datum ...) result1 result2 ...) clause1 clause2 ...)
     (if (memv key '(datum ...)) (begin result1 result2 ...) (case key clause1 clause2 ...)))))

(define-syntax do
  (syntax-rules ()
    ((_ ((var init step ...) ...) (test expr ...) command ...)
     (let %do-loop ((var init) ...)
       (if test
           (begin (if #f #f) expr ...)
           (begin command ... (%do-loop (do "step" var step ...) ...)))))
    ((_ "step" x) x)
    ((_ "step" x y) y)))

(define-syntax assert
  (syntax-rules ()
    ((_ e) (if e #t (error "assertion failed:" 'e)))))

;;; Promises

(define (make-promise thunk)
  (let ((done #f) (value #f))
    (lambda ()
      (if done
          value
          (let ((result (thunk)))
            (if done
                value
                (begin (set! done #t) (set! value result) value)))))))

(define-syntax delay
  (syntax-rules ()
    ((_ expr) (make-promise (lambda () expr)))))

(define (force promise)
  (if (procedure? promise) (promise) promise))

;;; Lists

(define (%cars lists)
  (if (null? lists) '() (cons (car (car lists)) (%cars (cdr lists)))))

(define (%cdrs lists)
  (if (null? lists) '() (cons (cdr (car lists)) (%cdrs (cdr lists)))))

(define (%any-null? lists)
  (if (null? lists) #f (if (null? (car lists)) #t (%any-null? (cdr lists)))))

(define (map f list1 . lists)
  (if (null? lists)
      (let loop ((l list1) (acc '()))
        (if (pair? l) (loop (cdr l) (cons (f (car l)) acc)) (reverse acc)))
      (let loop ((ls (cons list1 lists)) (acc '()))
        (if (%any-null? ls)
            (reverse acc)
            (loop (%cdrs ls) (cons (apply f (%cars ls)) acc))))))

(define (for-each f list1 . lists)
  (if (null? lists)
      (let loop ((l list1))
        (if (pair? l) (begin (f (car l)) (loop (cdr l)))))
      (let loop ((ls (cons list1 lists)))
        (if (%any-null? ls)
            (if #f #f)
            (begin (apply f (%cars ls)) (loop (%cdrs ls)))))))

(define (filter pred l)
  (let loop ((l l) (acc '()))
    (cond ((null? l) (reverse acc))
          ((pred (car l)) (loop (cdr l) (cons (car l) acc)))
          (else (loop (cdr l) acc)))))

(define (fold-left f init l)
  (if (null? l) init (fold-left f (f init (car l)) (cdr l))))

(define (fold-right f init l)
  (fold-left (lambda (acc x) (f x acc)) init (reverse l)))

(define (reduce f initial l)
  (if (null? l) initial (fold-left (lambda (acc x) (f x acc)) (car l) (cdr l))))

(define (append-map f l)
  (apply append (map f l)))

(define (iota count . args)
  (let ((start (if (pair? args) (car args) 0))
        (step (if (and (pair? args) (pair? (cdr args))) (cadr args) 1)))
    (let loop ((i (- count 1)) (acc '()))
      (if (< i 0) acc (loop (- i 1) (cons (+ start (* i step)) acc))))))

(define (list-index pred l)
  (let loop ((l l) (i 0))
    (cond ((null? l) #f)
          ((pred (car l)) i)
          (else (loop (cdr l) (+ i 1))))))

(define (any pred l)
  (if (null? l) #f (or (pred (car l)) (any pred (cdr l)))))

(define (every pred l)
  (cond ((null? l) #t)
        ((null? (cdr l)) (pred (car l)))
        ((pred (car l)) (every pred (cdr l)))
        (else #f)))

(define (%member-by same? x l)
  (cond ((null? l) #f)
        ((same? x (car l)) l)
        (else (%member-by same? x (cdr l)))))

(define (memq x l) (%member-by eq? x l))
(define (memv x l) (%member-by eqv? x l))
(define (member x l) (%member-by equal? x l))

(define (%assoc-by same? key alist)
  (cond ((null? alist) #f)
        ((same? key (car (car alist))) (car alist))
        (else (%assoc-by same? key (cdr alist)))))

(define (assq key alist) (%assoc-by eq? key alist))
(define (assv key alist) (%assoc-by eqv? key alist))
(define (assoc key alist) (%assoc-by equal? key alist))

;;; Vectors and strings

(define (vector-map f v)
  (list->vector (map f (vector->list v))))

(define (vector-for-each f v)
  (for-each f (vector->list v)))

(define (string-for-each f s)
  (for-each f (string->list s)))

;;; Multiple values

(define (call-with-values producer consumer)
  (apply consumer (%values->list (producer))))
"#;

/// Evaluate the prelude into `rt`'s top-level environment, compiling each
/// defined procedure up front when configured to.
pub(crate) fn load(rt: &Runtime) {
    let eager = rt.config().jit && rt.config().compile_bootstrap;
    for form in rt.read(PRELUDE) {
        if let Err(err) = rt.eval(&form) {
            warn!("bootstrap form failed: {err}");
            continue;
        }
        if !eager {
            continue;
        }
        for name in internal_defines(rt.keywords(), &form) {
            let Some(value) = rt.global().lookup(&name) else {
                continue;
            };
            if rt.compile(&value) == Some(CompileState::Failed) {
                debug!("bootstrap procedure {name} stays interpreted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::host::BufferSink;
    use crate::language::{CompileState, Value};
    use crate::runtime::Runtime;

    #[test]
    fn test_prelude_loads_cleanly() {
        let rt = Runtime::with_output(RuntimeConfig::default(), BufferSink::new());
        for name in ["map", "for-each", "filter", "assoc", "call-with-values", "force"] {
            assert!(rt.lookup(name).is_some(), "{name} is not defined");
        }
    }

    #[test]
    fn test_prelude_procedures_compile_eagerly() {
        let rt = Runtime::with_output(RuntimeConfig::default(), BufferSink::new());
        let map = rt.lookup("map").unwrap();
        assert_eq!(rt.compile(&map), Some(CompileState::Compiled));
        let Value::Lambda(filter) = rt.lookup("filter").unwrap() else {
            panic!("filter is not a lambda");
        };
        assert_eq!(filter.compile_state(), CompileState::Compiled);
    }

    #[test]
    fn test_interpreted_runtime_leaves_prelude_untried() {
        let rt = Runtime::with_output(RuntimeConfig::interpreted(), BufferSink::new());
        let Value::Lambda(map) = rt.lookup("map").unwrap() else {
            panic!("map is not a lambda");
        };
        assert_eq!(map.compile_state(), CompileState::Untried);
    }
}
